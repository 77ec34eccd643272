//! Redis-backed [`StockStore`](crate::StockStore).
//!
//! Authoritative counters are shared by every process pointed at the same Redis
//! instance and prefix, which is what makes the coordinator's lock fleet-wide.

mod common;
pub use common::*;

mod redis_stock_store;
pub use redis_stock_store::*;
