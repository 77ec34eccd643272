use std::{ops::Deref, sync::Arc};

use dashmap::DashMap;

use crate::{FlashStockError, ItemId};

/// A validated newtype for store key fragments (e.g. the key prefix).
///
/// This is a string with the following constraints:
/// - Must not be empty
/// - Must not be longer than 255 bytes
/// - Must not contain colons
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq)]
pub struct StoreKey(Arc<str>);

impl StoreKey {
    /// Create a new default prefix.
    pub fn default_prefix() -> Self {
        Self(Arc::from("flashstock"))
    }
}

impl Deref for StoreKey {
    type Target = Arc<str>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<String> for StoreKey {
    type Error = FlashStockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(FlashStockError::InvalidStoreKey(
                "Store key must not be empty".to_string(),
            ))
        } else if value.len() > 255 {
            Err(FlashStockError::InvalidStoreKey(
                "Store key must not be longer than 255 characters".to_string(),
            ))
        } else if value.contains(':') {
            Err(FlashStockError::InvalidStoreKey(
                "Store key must not contain colons".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

/// Builds and caches the per-item store keys: `<prefix>:<sid>:<suffix>`.
#[derive(Debug)]
pub(crate) struct StockKeyGenerator {
    pub prefix: StoreKey,
    pub count_key_suffix: &'static str,
    pub sale_key_suffix: &'static str,
    pub lock_key_suffix: &'static str,

    // caches
    count_key_cache: DashMap<ItemId, Arc<str>>,
    sale_key_cache: DashMap<ItemId, Arc<str>>,
    lock_key_cache: DashMap<ItemId, Arc<str>>,
}

impl StockKeyGenerator {
    pub(crate) fn new(prefix: StoreKey) -> Self {
        Self {
            prefix,
            count_key_suffix: "count",
            sale_key_suffix: "sale",
            lock_key_suffix: "lock",
            count_key_cache: DashMap::new(),
            sale_key_cache: DashMap::new(),
            lock_key_cache: DashMap::new(),
        }
    }

    fn cached(&self, cache: &DashMap<ItemId, Arc<str>>, sid: ItemId, suffix: &str) -> Arc<str> {
        if let Some(value) = cache.get(&sid) {
            return value.clone();
        }

        let value: Arc<str> = Arc::from(format!("{}:{}:{}", *self.prefix, sid, suffix));
        cache.insert(sid, value.clone());

        value
    }

    /// Key of the remaining-units counter.
    pub(crate) fn get_count_key(&self, sid: ItemId) -> Arc<str> {
        self.cached(&self.count_key_cache, sid, self.count_key_suffix)
    }

    /// Key of the sold-units counter.
    pub(crate) fn get_sale_key(&self, sid: ItemId) -> Arc<str> {
        self.cached(&self.sale_key_cache, sid, self.sale_key_suffix)
    }

    /// Name of the per-item lock.
    pub(crate) fn get_lock_key(&self, sid: ItemId) -> Arc<str> {
        self.cached(&self.lock_key_cache, sid, self.lock_key_suffix)
    }

    /// Forget the cached keys of an item whose sale has ended.
    pub(crate) fn evict(&self, sid: ItemId) {
        self.count_key_cache.remove(&sid);
        self.sale_key_cache.remove(&sid);
        self.lock_key_cache.remove(&sid);
    }
}
