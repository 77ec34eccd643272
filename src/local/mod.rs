//! In-process state of the admission pipeline.
//!
//! Everything here lives in the current process and never performs I/O, so every
//! operation completes in microseconds.
//!
//! # Components
//!
//! - [`TokenBucket`]: lock-free admission gate, refilled by a background loop
//! - [`LocalStockLedger`]: per-item primary and buffer pools that absorb most decrements
//!   before the shared store is consulted
//!
//! # Key Characteristics
//!
//! - **Thread-safe:** atomics for the bucket, a sharded [`DashMap`](dashmap::DashMap) for
//!   the ledger
//! - **Per-key serialization:** ledger operations on one item never interleave
//! - **Process-scoped:** state is not shared across processes; the shared store is the
//!   source of truth

mod local_stock_ledger;
pub use local_stock_ledger::*;

mod token_bucket;
pub use token_bucket::*;
