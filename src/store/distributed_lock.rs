use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use crate::{FlashStockError, StockStore, runtime};

/// Configuration for the per-item distributed lock.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Lease armed on every acquisition. Bounds how long a crashed or cancelled holder
    /// can block the item.
    pub lease_ms: u64,
    /// Maximum time to wait for the lock before giving up with
    /// [`FlashStockError::LockTimeout`].
    pub acquire_timeout_ms: u64,
    /// First backoff between acquisition attempts.
    pub initial_backoff_ms: u64,
    /// Backoff ceiling.
    pub max_backoff_ms: u64,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            lease_ms: 10_000,
            acquire_timeout_ms: 3_000,
            initial_backoff_ms: 1,
            max_backoff_ms: 50,
        }
    }
}

impl LockOptions {
    pub(crate) fn validate(&self) -> Result<(), FlashStockError> {
        if self.lease_ms == 0 {
            return Err(FlashStockError::InvalidLockOptions(
                "Lock lease must be greater than 0".to_string(),
            ));
        }

        if self.acquire_timeout_ms == 0 {
            return Err(FlashStockError::InvalidLockOptions(
                "Lock acquire timeout must be greater than 0".to_string(),
            ));
        }

        if self.initial_backoff_ms == 0 || self.max_backoff_ms < self.initial_backoff_ms {
            return Err(FlashStockError::InvalidLockOptions(
                "Lock backoff must satisfy 0 < initial <= max".to_string(),
            ));
        }

        Ok(())
    }
}

/// Proof of a successful [`DistributedLock::acquire`]. Hand it back to
/// [`DistributedLock::release`].
#[derive(Debug)]
#[must_use = "a lock hold must be released"]
pub struct LockHold {
    name: Arc<str>,
    holder: String,
}

impl LockHold {
    /// Lock name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Holder id presented to the store for this acquisition.
    pub fn holder(&self) -> &str {
        &self.holder
    }
}

/// Blocking, timeout-bounded acquisition on top of [`StockStore`]'s lock primitives.
///
/// Each acquisition gets its own holder id (`<client id>:<sequence>`), so concurrent
/// tasks sharing one `DistributedLock` exclude each other exactly like separate
/// processes do. Acquisition retries with exponential backoff and jitter until the
/// configured timeout elapses; it never waits longer than that.
pub struct DistributedLock<S: StockStore> {
    store: Arc<S>,
    client_id: String,
    sequence: AtomicU64,
    options: LockOptions,
}

impl<S: StockStore> DistributedLock<S> {
    /// Create a lock handle with a fresh random client id.
    pub fn new(store: Arc<S>, options: LockOptions) -> Result<Self, FlashStockError> {
        options.validate()?;

        Ok(Self {
            store,
            client_id: format!("{:016x}", rand::random::<u64>()),
            sequence: AtomicU64::new(0),
            options,
        })
    }

    /// Random id shared by every holder this handle creates.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Lock configuration.
    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Wait for the lock `name`.
    ///
    /// Fails with [`FlashStockError::LockTimeout`] once `acquire_timeout_ms` has elapsed.
    /// Store errors are returned immediately.
    pub async fn acquire(&self, name: impl Into<Arc<str>>) -> Result<LockHold, FlashStockError> {
        let name: Arc<str> = name.into();
        let holder = format!(
            "{}:{}",
            self.client_id,
            self.sequence.fetch_add(1, Ordering::Relaxed)
        );

        let deadline = Instant::now() + Duration::from_millis(self.options.acquire_timeout_ms);
        let lease = Duration::from_millis(self.options.lease_ms);
        let mut backoff_ms = self.options.initial_backoff_ms;

        loop {
            if self.store.try_acquire_lock(&name, &holder, lease).await? {
                tracing::debug!(lock = %name, holder = %holder, "lock acquired");
                return Ok(LockHold { name, holder });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(FlashStockError::LockTimeout {
                    name: name.to_string(),
                    timeout_ms: self.options.acquire_timeout_ms,
                });
            }

            // thread-local rng must not live across the await
            let jitter = rand::random_range(0..=backoff_ms / 2);
            let wait = Duration::from_millis(backoff_ms + jitter).min(deadline - now);

            runtime::sleep(wait).await;

            backoff_ms = (backoff_ms * 2).min(self.options.max_backoff_ms);
        }
    } // end method acquire

    /// Release a hold obtained from [`acquire`](Self::acquire).
    ///
    /// Returns `false` if the store no longer considered it held, typically because the
    /// lease ran out.
    pub async fn release(&self, hold: LockHold) -> Result<bool, FlashStockError> {
        let released = self.store.release_lock(&hold.name, &hold.holder).await?;

        if released {
            tracing::debug!(lock = %hold.name, holder = %hold.holder, "lock released");
        } else {
            tracing::warn!(lock = %hold.name, holder = %hold.holder, "lock was not held at release, lease expired?");
        }

        Ok(released)
    } // end method release
}
