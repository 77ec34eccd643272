use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};

use crate::{FlashStockError, StockStore};

#[derive(Debug)]
struct LockEntry {
    holder: String,
    holds: u32,
    expires_at: Instant,
}

/// In-process [`StockStore`].
///
/// Counters and locks live in [`DashMap`](dashmap::DashMap)s; each operation runs under
/// the shard guard of its key and is therefore atomic. Locks are reentrant per holder
/// and expire after their lease exactly like the Redis backend.
///
/// Useful for tests, load tests and single-process deployments where the "shared"
/// store does not need to outlive the process.
#[derive(Debug, Default)]
pub struct MemoryStockStore {
    counters: DashMap<String, i64>,
    locks: DashMap<String, LockEntry>,
}

impl MemoryStockStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live counters.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no counter exists.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    fn add(&self, key: &str, delta: i64) -> i64 {
        let mut value = self.counters.entry(key.to_string()).or_insert(0);
        *value += delta;
        *value
    }
}

#[async_trait]
impl StockStore for MemoryStockStore {
    async fn get(&self, key: &str) -> Result<i64, FlashStockError> {
        Ok(self.counters.get(key).map(|value| *value).unwrap_or(0))
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), FlashStockError> {
        self.counters.insert(key.to_string(), value);
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64, FlashStockError> {
        Ok(self.add(key, 1))
    }

    async fn decrement(&self, key: &str) -> Result<i64, FlashStockError> {
        Ok(self.add(key, -1))
    }

    async fn delete(&self, key: &str) -> Result<bool, FlashStockError> {
        Ok(self.counters.remove(key).is_some())
    }

    async fn try_acquire_lock(
        &self,
        name: &str,
        holder: &str,
        lease: Duration,
    ) -> Result<bool, FlashStockError> {
        let now = Instant::now();

        match self.locks.entry(name.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(LockEntry {
                    holder: holder.to_string(),
                    holds: 1,
                    expires_at: now + lease,
                });
                Ok(true)
            }
            Entry::Occupied(mut occupied) => {
                let lock = occupied.get_mut();

                if lock.expires_at <= now {
                    *lock = LockEntry {
                        holder: holder.to_string(),
                        holds: 1,
                        expires_at: now + lease,
                    };
                    Ok(true)
                } else if lock.holder == holder {
                    lock.holds += 1;
                    lock.expires_at = now + lease;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn release_lock(&self, name: &str, holder: &str) -> Result<bool, FlashStockError> {
        let Entry::Occupied(mut occupied) = self.locks.entry(name.to_string()) else {
            return Ok(false);
        };

        let lock = occupied.get_mut();
        if lock.holder != holder || lock.expires_at <= Instant::now() {
            return Ok(false);
        }

        lock.holds -= 1;
        if lock.holds == 0 {
            occupied.remove();
        }

        Ok(true)
    }
}
