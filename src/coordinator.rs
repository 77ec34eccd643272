//! Distributed stock coordinator.
//!
//! Serializes decrements of the authoritative stock record across every process that
//! shares the store, using one lock per item.

use std::sync::Arc;

use crate::{
    DistributedLock, FlashStockError, ItemId, LockOptions, Stock, StockKeyGenerator,
    StockStore, StoreKey, runtime,
};

/// Configuration for [`StockCoordinator`].
#[derive(Clone, Debug, Default)]
pub struct StockCoordinatorOptions {
    /// Optional prefix for all store keys.
    ///
    /// Keys are `<prefix>:<sid>:count`, `<prefix>:<sid>:sale` and `<prefix>:<sid>:lock`.
    /// If `None`, defaults to `"flashstock"`.
    pub prefix: Option<StoreKey>,
    /// Per-item lock configuration.
    pub lock: LockOptions,
}

/// Result of [`StockCoordinator::decrement_authoritative`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthoritativeDecrement {
    /// One unit moved from `count` to `sale`.
    Sold(Stock),
    /// `count` was already below 1. Nothing changed.
    Exhausted,
}

/// Owner of the authoritative `count` / `sale` counters.
///
/// # Algorithm
///
/// 1. Acquire the item's lock (bounded wait)
/// 2. Read `count`; if it is below 1, release and report [`AuthoritativeDecrement::Exhausted`]
/// 3. Read `sale`, decrement `count`, increment `sale`
/// 4. Release the lock
/// 5. Return `{ count: count - 1, sale: sale + 1 }`
///
/// The lock is held only across steps 2-3 and is released on every exit path,
/// including store errors inside the window. Steps 1-4 run on a detached task, so a
/// caller that stops waiting does not cut the sequence short. A holder that never gets
/// to release (crash, runtime shutdown) is cut off by the lock lease.
///
/// Cloning is cheap and clones share the lock's client id.
///
/// # Errors
///
/// - [`FlashStockError::LockTimeout`] when the lock cannot be taken in time
/// - [`FlashStockError::StoreUnavailable`] for any store failure; the underlying error
///   is logged
///
/// The coordinator never retries and never deduplicates: one call is one attempt.
pub struct StockCoordinator<S: StockStore> {
    inner: Arc<CoordinatorInner<S>>,
}

struct CoordinatorInner<S: StockStore> {
    store: Arc<S>,
    key_generator: StockKeyGenerator,
    lock: DistributedLock<S>,
}

impl<S: StockStore> Clone for StockCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: StockStore> StockCoordinator<S> {
    /// Create a coordinator over `store`.
    pub fn new(store: Arc<S>, options: StockCoordinatorOptions) -> Result<Self, FlashStockError> {
        let prefix = options.prefix.unwrap_or_else(StoreKey::default_prefix);

        Ok(Self {
            inner: Arc::new(CoordinatorInner {
                lock: DistributedLock::new(store.clone(), options.lock)?,
                key_generator: StockKeyGenerator::new(prefix),
                store,
            }),
        })
    } // end constructor

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    /// Lock handle used for per-item serialization.
    pub fn lock(&self) -> &DistributedLock<S> {
        &self.inner.lock
    }

    /// Name of the lock guarding `sid`.
    pub fn lock_name(&self, sid: ItemId) -> Arc<str> {
        self.inner.key_generator.get_lock_key(sid)
    }

    /// Seed the authoritative record before the sale opens: `count = initial_count`,
    /// `sale = 0`.
    pub async fn warm_up(&self, sid: ItemId, initial_count: u64) -> Result<(), FlashStockError> {
        let count = i64::try_from(initial_count).map_err(|_| {
            FlashStockError::InvalidStockCount(format!(
                "initial count {initial_count} does not fit a signed 64-bit counter"
            ))
        })?;

        let inner = &self.inner;
        let count_key = inner.key_generator.get_count_key(sid);
        let sale_key = inner.key_generator.get_sale_key(sid);

        inner
            .store
            .set(&count_key, count)
            .await
            .map_err(|err| unavailable(sid, "write count", err))?;
        inner
            .store
            .set(&sale_key, 0)
            .await
            .map_err(|err| unavailable(sid, "write sale", err))?;

        tracing::debug!(sid = %sid, count, "authoritative stock warmed up");

        Ok(())
    } // end method warm_up

    /// Delete the authoritative record once the sale is over.
    ///
    /// Returns whether anything was deleted.
    pub async fn clear(&self, sid: ItemId) -> Result<bool, FlashStockError> {
        let inner = &self.inner;

        let count_deleted = inner
            .store
            .delete(&inner.key_generator.get_count_key(sid))
            .await
            .map_err(|err| unavailable(sid, "delete count", err))?;
        let sale_deleted = inner
            .store
            .delete(&inner.key_generator.get_sale_key(sid))
            .await
            .map_err(|err| unavailable(sid, "delete sale", err))?;

        inner.key_generator.evict(sid);

        Ok(count_deleted || sale_deleted)
    } // end method clear

    /// Read the authoritative record without taking the lock.
    ///
    /// The two counters are read separately, so a concurrent decrement can be observed
    /// half-applied. Meant for monitoring and post-sale checks, not for decisions.
    pub async fn snapshot(&self, sid: ItemId) -> Result<Stock, FlashStockError> {
        let inner = &self.inner;

        let count = inner
            .store
            .get(&inner.key_generator.get_count_key(sid))
            .await
            .map_err(|err| unavailable(sid, "read count", err))?;
        let sale = inner
            .store
            .get(&inner.key_generator.get_sale_key(sid))
            .await
            .map_err(|err| unavailable(sid, "read sale", err))?;

        Ok(Stock {
            id: sid,
            count: non_negative(sid, "count", count)?,
            sale: non_negative(sid, "sale", sale)?,
        })
    } // end method snapshot

    /// Move one unit of `sid` from `count` to `sale` under the item's lock.
    ///
    /// Dropping the returned future does not interrupt a decrement already under way.
    pub async fn decrement_authoritative(
        &self,
        sid: ItemId,
    ) -> Result<AuthoritativeDecrement, FlashStockError> {
        let inner = Arc::clone(&self.inner);

        runtime::run_detached(async move { inner.decrement(sid).await }).await?
    } // end method decrement_authoritative

    /// Same as [`decrement_authoritative`](Self::decrement_authoritative) but on the
    /// current task. The caller must drive it to completion.
    pub(crate) async fn decrement_on_current_task(
        &self,
        sid: ItemId,
    ) -> Result<AuthoritativeDecrement, FlashStockError> {
        self.inner.decrement(sid).await
    }
} // end of impl

impl<S: StockStore> CoordinatorInner<S> {
    async fn decrement(&self, sid: ItemId) -> Result<AuthoritativeDecrement, FlashStockError> {
        let hold = match self.lock.acquire(self.key_generator.get_lock_key(sid)).await {
            Ok(hold) => hold,
            Err(err @ FlashStockError::LockTimeout { .. }) => {
                tracing::warn!(sid = %sid, error = %err, "authoritative decrement gave up on lock");
                return Err(err);
            }
            Err(err) => return Err(unavailable(sid, "acquire lock", err)),
        };

        let result = self.decrement_locked(sid).await;

        if let Err(err) = self.lock.release(hold).await {
            // the lease frees the lock; the outcome of the critical section stands
            tracing::error!(sid = %sid, error = ?err, "failed to release stock lock");
        }

        result
    } // end method decrement

    async fn decrement_locked(&self, sid: ItemId) -> Result<AuthoritativeDecrement, FlashStockError> {
        let count_key = self.key_generator.get_count_key(sid);
        let sale_key = self.key_generator.get_sale_key(sid);

        let count = self
            .store
            .get(&count_key)
            .await
            .map_err(|err| unavailable(sid, "read count", err))?;

        if count < 1 {
            tracing::debug!(sid = %sid, count, "authoritative stock exhausted");
            return Ok(AuthoritativeDecrement::Exhausted);
        }

        let sale = self
            .store
            .get(&sale_key)
            .await
            .map_err(|err| unavailable(sid, "read sale", err))?;
        let sale = non_negative(sid, "sale", sale)?;

        self.store
            .decrement(&count_key)
            .await
            .map_err(|err| unavailable(sid, "decrement count", err))?;

        if let Err(err) = self.store.increment(&sale_key).await {
            // put the unit back so count + sale stays equal to the allocation
            if let Err(restore_err) = self.store.increment(&count_key).await {
                tracing::error!(
                    sid = %sid,
                    error = ?restore_err,
                    "failed to restore count after sale increment failed, record is short one unit"
                );
            }

            return Err(unavailable(sid, "increment sale", err));
        }

        Ok(AuthoritativeDecrement::Sold(Stock {
            id: sid,
            count: (count - 1) as u64,
            sale: sale + 1,
        }))
    } // end method decrement_locked
} // end of impl

fn unavailable(sid: ItemId, operation: &str, err: FlashStockError) -> FlashStockError {
    tracing::error!(sid = %sid, operation, error = ?err, "stock store operation failed");

    match err {
        FlashStockError::StoreUnavailable(_) => err,
        err => FlashStockError::StoreUnavailable(format!("{operation}: {err}")),
    }
}

fn non_negative(sid: ItemId, counter: &str, value: i64) -> Result<u64, FlashStockError> {
    u64::try_from(value).map_err(|_| {
        tracing::error!(sid = %sid, counter, value, "negative stock counter in store");
        FlashStockError::StoreUnavailable(format!("negative {counter} counter for item {sid}"))
    })
}
