use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Script};

use crate::{FlashStockError, FlashStockRedisClient, StockStore};

// The lock is a hash at the lock key mapping holder id -> reentry count, with a
// millisecond lease on the whole key.
const ACQUIRE_LOCK_SCRIPT: &str = r#"
    local lock_key = KEYS[1]
    local holder = ARGV[1]
    local lease_ms = tonumber(ARGV[2])

    if redis.call("EXISTS", lock_key) == 0 then
        redis.call("HSET", lock_key, holder, 1)
        redis.call("PEXPIRE", lock_key, lease_ms)
        return 1
    end

    if redis.call("HEXISTS", lock_key, holder) == 1 then
        redis.call("HINCRBY", lock_key, holder, 1)
        redis.call("PEXPIRE", lock_key, lease_ms)
        return 1
    end

    return 0
"#;

const RELEASE_LOCK_SCRIPT: &str = r#"
    local lock_key = KEYS[1]
    local holder = ARGV[1]

    if redis.call("HEXISTS", lock_key, holder) == 0 then
        return 0
    end

    local remaining = redis.call("HINCRBY", lock_key, holder, -1)
    if remaining <= 0 then
        redis.call("DEL", lock_key)
    end

    return 1
"#;

/// Configuration for [`RedisStockStore`].
///
/// # Requirements
///
/// - **Redis version:** >= 6.2.0
/// - **Runtime:** Tokio or Smol (via `redis-tokio` or `redis-smol` features)
#[derive(Clone, Debug)]
pub struct RedisStockStoreOptions {
    /// Connection pool used for every command.
    pub client: FlashStockRedisClient,
}

/// [`StockStore`] backed by Redis.
///
/// Counters are plain integer keys driven by `GET`/`SET`/`INCR`/`DECR`/`DEL`. The lock
/// is acquired and released by Lua scripts so the holder check and the mutation happen
/// atomically inside Redis.
///
/// # Examples
///
/// ```no_run
/// use flashstock::{FlashStockError, FlashStockRedisClient, RedisStockStore, RedisStockStoreOptions};
///
/// async fn connect() -> Result<RedisStockStore, FlashStockError> {
///     let client = redis::Client::open("redis://127.0.0.1:6379/")?;
///
///     Ok(RedisStockStore::new(RedisStockStoreOptions {
///         client: FlashStockRedisClient::from_client(client, 4).await?,
///     }))
/// }
/// ```
#[derive(Clone, Debug)]
pub struct RedisStockStore {
    client: FlashStockRedisClient,
    acquire_lock_script: Script,
    release_lock_script: Script,
}

impl RedisStockStore {
    /// Create a new store.
    pub fn new(options: RedisStockStoreOptions) -> Self {
        Self {
            client: options.client,
            acquire_lock_script: Script::new(ACQUIRE_LOCK_SCRIPT),
            release_lock_script: Script::new(RELEASE_LOCK_SCRIPT),
        }
    }
}

#[async_trait]
impl StockStore for RedisStockStore {
    async fn get(&self, key: &str) -> Result<i64, FlashStockError> {
        let mut connection_manager = self.client.get();
        let value: Option<i64> = connection_manager.get(key).await?;

        Ok(value.unwrap_or(0))
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), FlashStockError> {
        let mut connection_manager = self.client.get();
        let _: () = connection_manager.set(key, value).await?;

        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64, FlashStockError> {
        let mut connection_manager = self.client.get();
        let value: i64 = connection_manager.incr(key, 1i64).await?;

        Ok(value)
    }

    async fn decrement(&self, key: &str) -> Result<i64, FlashStockError> {
        let mut connection_manager = self.client.get();
        let value: i64 = connection_manager.decr(key, 1i64).await?;

        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<bool, FlashStockError> {
        let mut connection_manager = self.client.get();
        let removed: u64 = connection_manager.del(key).await?;

        Ok(removed > 0)
    }

    async fn try_acquire_lock(
        &self,
        name: &str,
        holder: &str,
        lease: Duration,
    ) -> Result<bool, FlashStockError> {
        let mut connection_manager = self.client.get();

        let acquired: i64 = self
            .acquire_lock_script
            .key(name)
            .arg(holder)
            .arg(lease.as_millis() as u64)
            .invoke_async(&mut connection_manager)
            .await?;

        Ok(acquired == 1)
    }

    async fn release_lock(&self, name: &str, holder: &str) -> Result<bool, FlashStockError> {
        let mut connection_manager = self.client.get();

        let released: i64 = self
            .release_lock_script
            .key(name)
            .arg(holder)
            .invoke_async(&mut connection_manager)
            .await?;

        Ok(released == 1)
    }
}
