//! Contract for the shared ground-truth store and its backends.
//!
//! The coordinator only needs atomic single-key counters and a named, reentrant
//! mutual-exclusion lock with a bounded hold time. [`StockStore`] captures exactly
//! that; [`DistributedLock`] layers the blocking, timeout-bounded acquisition on top of
//! the non-blocking lock primitives.
//!
//! # Backends
//!
//! - [`MemoryStockStore`]: in-process, for tests, single-node deployments and load tests
//! - `RedisStockStore`: Redis-backed (features `redis-tokio` / `redis-smol`)

use std::time::Duration;

use async_trait::async_trait;

use crate::FlashStockError;

mod common;
pub use common::*;

mod distributed_lock;
pub use distributed_lock::*;

mod memory_stock_store;
pub use memory_stock_store::*;

/// Shared store holding the authoritative stock records.
///
/// Every method is a single atomic operation on one key. Counter keys that were never
/// written read as `0`.
///
/// Lock semantics:
///
/// - `try_acquire_lock` succeeds if the lock is free, expired, or already held by
///   `holder` (reentrant; each success must be paired with one `release_lock`)
/// - a successful acquire (re)arms the lease, after which the lock frees itself even
///   if the holder never releases it
/// - `release_lock` only affects a lock held by `holder` and returns `false` otherwise
#[async_trait]
pub trait StockStore: Send + Sync + 'static {
    /// Read a counter.
    async fn get(&self, key: &str) -> Result<i64, FlashStockError>;

    /// Overwrite a counter.
    async fn set(&self, key: &str, value: i64) -> Result<(), FlashStockError>;

    /// Add one to a counter and return the new value.
    async fn increment(&self, key: &str) -> Result<i64, FlashStockError>;

    /// Subtract one from a counter and return the new value.
    async fn decrement(&self, key: &str) -> Result<i64, FlashStockError>;

    /// Delete a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, FlashStockError>;

    /// Try to take (or re-enter) the lock `name` on behalf of `holder` without waiting.
    async fn try_acquire_lock(
        &self,
        name: &str,
        holder: &str,
        lease: Duration,
    ) -> Result<bool, FlashStockError>;

    /// Release one level of `holder`'s hold on the lock `name`.
    async fn release_lock(&self, name: &str, holder: &str) -> Result<bool, FlashStockError>;
}
