#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod flash_sale;
pub use flash_sale::*;

pub mod local;
pub use local::*;

pub mod store;
pub use store::*;

mod coordinator;
pub use coordinator::*;

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
pub mod redis;
#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
pub use self::redis::*;

mod error;
pub use error::*;

mod common;
pub use common::{
    BufferRatio, ItemId, LocalDecrement, PurchaseDecision, RefillIntervalMs, SoldOutReason, Stock,
    TokenCapacity,
};

mod runtime;

#[cfg(test)]
mod tests;
