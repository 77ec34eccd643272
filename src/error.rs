/// Error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum FlashStockError {
    /// Redis error.
    #[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
    #[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// The shared store could not be reached or answered with an error.
    ///
    /// Raw backend errors on the purchase path are logged and folded into this variant.
    #[error("shared stock store unavailable: {0}")]
    StoreUnavailable(String),

    /// The per-item lock could not be acquired within the configured timeout.
    #[error("timed out after {timeout_ms}ms waiting for lock `{name}`")]
    LockTimeout {
        /// Lock name (store key).
        name: String,
        /// Configured acquire timeout.
        timeout_ms: u64,
    },

    /// Invalid store key or key prefix.
    #[error("invalid store key: {0}")]
    InvalidStoreKey(String),

    /// Invalid token bucket capacity or initial token count.
    #[error("invalid token capacity: {0}")]
    InvalidTokenCapacity(String),

    /// Invalid refill interval.
    #[error("invalid refill interval: {0}")]
    InvalidRefillInterval(String),

    /// Invalid local buffer ratio.
    #[error("invalid buffer ratio: {0}")]
    InvalidBufferRatio(String),

    /// Invalid distributed lock options.
    #[error("invalid lock options: {0}")]
    InvalidLockOptions(String),

    /// Invalid initial stock count (does not fit the store's signed counters).
    #[error("invalid stock count: {0}")]
    InvalidStockCount(String),

    /// Invalid Redis client connection count.
    #[error("invalid redis client connection count: {0}")]
    InvalidRedisClientConnectionCount(String),
}

impl FlashStockError {
    /// Whether the failure is transient and the caller may retry the purchase.
    ///
    /// Sold-out and rate-limited results are not errors; only lock timeouts and store
    /// outages reach the caller as `Err` from the purchase path.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::LockTimeout { .. })
    }
}
