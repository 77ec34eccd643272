use std::sync::atomic::{AtomicU64, Ordering};

use crate::{FlashStockError, RefillIntervalMs, TokenCapacity};

/// Configuration for [`TokenBucket`].
#[derive(Clone, Debug)]
pub struct TokenBucketOptions {
    /// Maximum number of tokens the bucket can hold.
    pub capacity: TokenCapacity,
    /// Tokens available right after construction. Must not exceed `capacity`.
    pub initial_tokens: u64,
    /// Period of the background refill task. Each tick adds one token.
    pub refill_interval_ms: RefillIntervalMs,
}

impl Default for TokenBucketOptions {
    /// 500 initial tokens, capacity 5000, one token per millisecond.
    fn default() -> Self {
        Self {
            capacity: TokenCapacity::default(),
            initial_tokens: 500,
            refill_interval_ms: RefillIntervalMs::default(),
        }
    }
}

/// Lock-free token bucket gating admission to the stock pipeline.
///
/// # Algorithm
///
/// - [`acquire_token`](Self::acquire_token) atomically takes one token if any is left
/// - [`refill`](Self::refill) atomically adds one token unless the bucket is full
///
/// Both are single compare-and-swap loops on one counter, so no token is lost or
/// handed out twice under any number of concurrent callers, and the counter always
/// stays within `0..=capacity`.
///
/// The steady-state admission rate is one request per refill interval; `capacity`
/// bounds the burst that can be admitted after an idle period.
///
/// # Examples
///
/// ```no_run
/// use flashstock::{TokenBucket, TokenBucketOptions, TokenCapacity};
///
/// let bucket = TokenBucket::new(TokenBucketOptions {
///     capacity: TokenCapacity::try_from(2).unwrap(),
///     initial_tokens: 2,
///     ..Default::default()
/// })
/// .unwrap();
///
/// assert!(bucket.acquire_token());
/// assert!(bucket.acquire_token());
/// assert!(!bucket.acquire_token());
///
/// bucket.refill();
/// assert!(bucket.acquire_token());
/// ```
#[derive(Debug)]
pub struct TokenBucket {
    tokens: AtomicU64,
    capacity: TokenCapacity,
    refill_interval_ms: RefillIntervalMs,
}

impl TokenBucket {
    /// Create a new bucket holding `options.initial_tokens` tokens.
    pub fn new(options: TokenBucketOptions) -> Result<Self, FlashStockError> {
        if options.initial_tokens > *options.capacity {
            return Err(FlashStockError::InvalidTokenCapacity(format!(
                "Initial tokens ({}) must not exceed capacity ({})",
                options.initial_tokens, *options.capacity
            )));
        }

        Ok(Self {
            tokens: AtomicU64::new(options.initial_tokens),
            capacity: options.capacity,
            refill_interval_ms: options.refill_interval_ms,
        })
    } // end constructor

    /// Try to consume one token. Never blocks.
    ///
    /// Returns `false` without touching the counter when the bucket is empty.
    pub fn acquire_token(&self) -> bool {
        self.tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |tokens| {
                tokens.checked_sub(1)
            })
            .is_ok()
    } // end method acquire_token

    /// Add one token unless the bucket is already at capacity.
    ///
    /// Returns whether a token was added. Normally driven by the refill loop of
    /// [`FlashSale`](crate::FlashSale), but can be called directly.
    pub fn refill(&self) -> bool {
        let capacity = *self.capacity;

        self.tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |tokens| {
                (tokens < capacity).then_some(tokens + 1)
            })
            .is_ok()
    } // end method refill

    /// Tokens currently available.
    pub fn available(&self) -> u64 {
        self.tokens.load(Ordering::Acquire)
    }

    /// Bucket capacity.
    pub fn capacity(&self) -> u64 {
        *self.capacity
    }

    /// Configured refill period.
    pub fn refill_interval_ms(&self) -> RefillIntervalMs {
        self.refill_interval_ms
    }
} // end of impl
