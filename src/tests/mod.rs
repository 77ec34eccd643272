mod runtime;

mod test_stock_coordinator;
