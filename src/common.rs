use std::{fmt, ops::Deref};

use crate::FlashStockError;

/// Identifier of a sale item (`sid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(u64);

impl ItemId {
    /// Create a new item id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Deref for ItemId {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<u64> for ItemId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of the authoritative stock record after a successful decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stock {
    /// Item the snapshot belongs to.
    pub id: ItemId,
    /// Units still available.
    pub count: u64,
    /// Units sold.
    pub sale: u64,
}

/// Which local tier absorbed a decrement.
///
/// Returned by [`LocalStockLedger::try_decrement`](crate::LocalStockLedger::try_decrement)
/// and handed back to [`LocalStockLedger::rollback`](crate::LocalStockLedger::rollback)
/// when the shared store rejects the sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalDecrement {
    /// Taken from the primary pool.
    Primary,
    /// Primary pool was empty; taken from the buffer pool.
    Buffer,
    /// Both pools are empty. Nothing was taken.
    Exhausted,
}

/// Why a purchase was turned away as sold out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoldOutReason {
    /// Both local tiers are depleted; the shared store was not contacted.
    LocalExhausted,
    /// The shared store reported no remaining units; the local tier was rolled back.
    AuthoritativeExhausted,
}

/// End-to-end result of [`FlashSale::attempt_purchase`](crate::FlashSale::attempt_purchase).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseDecision {
    /// Admitted and sold; carries the post-decrement authoritative state.
    Sold(Stock),
    /// Admitted but there was no stock left.
    SoldOut(SoldOutReason),
    /// No admission token was available.
    RateLimited,
}

/// Token bucket capacity (maximum burst).
///
/// Must be greater than 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TokenCapacity(u64);

impl Default for TokenCapacity {
    /// Returns a capacity of 5000 tokens.
    fn default() -> Self {
        Self(5000)
    }
}

impl Deref for TokenCapacity {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for TokenCapacity {
    type Error = FlashStockError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err(FlashStockError::InvalidTokenCapacity(
                "Token capacity must be greater than 0".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

/// Period of the token bucket refill task, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefillIntervalMs(u64);

impl Default for RefillIntervalMs {
    /// Returns a refill interval of 1 ms.
    fn default() -> Self {
        Self(1)
    }
}

impl Deref for RefillIntervalMs {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for RefillIntervalMs {
    type Error = FlashStockError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err(FlashStockError::InvalidRefillInterval(
                "Refill interval must be greater than 0".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

/// Size of the local buffer pool relative to the initial primary allocation.
///
/// Must be within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct BufferRatio(f64);

impl BufferRatio {
    /// Buffer size for an initial allocation of `count` units, rounded to the nearest unit.
    pub fn buffer_for(&self, count: u64) -> u64 {
        (count as f64 * self.0).round() as u64
    }
}

impl Default for BufferRatio {
    /// Returns a ratio of 3%.
    fn default() -> Self {
        Self(0.03)
    }
}

impl Deref for BufferRatio {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<f64> for BufferRatio {
    type Error = FlashStockError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !(0f64..=1f64).contains(&value) {
            Err(FlashStockError::InvalidBufferRatio(
                "Buffer ratio must be within [0, 1]".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}
