use dashmap::DashMap;

use crate::{BufferRatio, ItemId, LocalDecrement};

/// Configuration for [`LocalStockLedger`].
#[derive(Clone, Debug, Default)]
pub struct LocalStockLedgerOptions {
    /// Buffer pool size relative to the initial allocation. Defaults to 3%.
    pub buffer_ratio: BufferRatio,
}

/// Local two-tier stock for a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalStockEntry {
    /// Main local pool, seeded with the full initial allocation.
    pub primary: u64,
    /// Secondary pool used once `primary` hits zero.
    pub buffer: u64,
}

/// In-process approximation of remaining stock.
///
/// Absorbs most decrement attempts without touching the shared store. An item only
/// escalates to the distributed path while one of its local tiers still has units;
/// once both are empty, requests are turned away locally.
///
/// # Thread Safety
///
/// Entries live in a [`DashMap`](dashmap::DashMap). `try_decrement` and `rollback`
/// mutate an entry only while holding its shard's write guard, so operations on the
/// same item are serialized while different items proceed in parallel on other shards.
///
/// # Semantics
///
/// - The local view may run ahead of or behind the shared store. The distributed
///   coordinator is the only authority on whether a sale is final.
/// - An item that was never registered (or was removed) decrements as
///   [`LocalDecrement::Exhausted`].
///
/// # Examples
///
/// ```no_run
/// use flashstock::{ItemId, LocalDecrement, LocalStockLedger, LocalStockLedgerOptions};
///
/// let ledger = LocalStockLedger::new(LocalStockLedgerOptions::default());
/// let sid = ItemId::new(1);
///
/// ledger.register_item(sid, 100);
/// let entry = ledger.entry(sid).unwrap();
/// assert_eq!((entry.primary, entry.buffer), (100, 3));
///
/// let hit = ledger.try_decrement(sid);
/// assert_eq!(hit, LocalDecrement::Primary);
///
/// // The shared store disagreed: give the unit back.
/// ledger.rollback(sid, hit);
/// assert_eq!(ledger.entry(sid).unwrap().primary, 100);
/// ```
pub struct LocalStockLedger {
    buffer_ratio: BufferRatio,
    entries: DashMap<ItemId, LocalStockEntry>,
}

impl LocalStockLedger {
    /// Create an empty ledger.
    pub fn new(options: LocalStockLedgerOptions) -> Self {
        Self {
            buffer_ratio: options.buffer_ratio,
            entries: DashMap::new(),
        }
    } // end constructor

    /// Seed the local tiers for `sid`.
    ///
    /// Sets `primary = initial_count` and `buffer = round(initial_count * buffer_ratio)`.
    /// Re-registering overwrites the previous entry; intended for sale setup only.
    pub fn register_item(&self, sid: ItemId, initial_count: u64) -> LocalStockEntry {
        let entry = LocalStockEntry {
            primary: initial_count,
            buffer: self.buffer_ratio.buffer_for(initial_count),
        };

        self.entries.insert(sid, entry);

        tracing::debug!(
            sid = %sid,
            primary = entry.primary,
            buffer = entry.buffer,
            "local stock registered"
        );

        entry
    } // end method register_item

    /// Take one unit from the primary pool, falling back to the buffer pool.
    ///
    /// Returns [`LocalDecrement::Exhausted`] without mutating anything when both pools
    /// are empty.
    pub fn try_decrement(&self, sid: ItemId) -> LocalDecrement {
        let Some(mut entry) = self.entries.get_mut(&sid) else {
            return LocalDecrement::Exhausted;
        };

        if entry.primary > 0 {
            entry.primary -= 1;
            LocalDecrement::Primary
        } else if entry.buffer > 0 {
            entry.buffer -= 1;
            LocalDecrement::Buffer
        } else {
            LocalDecrement::Exhausted
        }
    } // end method try_decrement

    /// Return a unit taken by a prior [`try_decrement`](Self::try_decrement) to the tier it
    /// came from.
    ///
    /// Returns whether a unit was restored. [`LocalDecrement::Exhausted`] took nothing and
    /// is ignored. If the entry has been removed in the meantime there is nothing to
    /// restore into.
    pub fn rollback(&self, sid: ItemId, outcome: LocalDecrement) -> bool {
        if outcome == LocalDecrement::Exhausted {
            return false;
        }

        let Some(mut entry) = self.entries.get_mut(&sid) else {
            tracing::warn!(sid = %sid, ?outcome, "local rollback skipped, item no longer registered");
            return false;
        };

        match outcome {
            LocalDecrement::Primary => entry.primary += 1,
            LocalDecrement::Buffer => entry.buffer += 1,
            LocalDecrement::Exhausted => unreachable!("exhausted outcomes return early"),
        }

        tracing::debug!(sid = %sid, ?outcome, "local stock rolled back");

        true
    } // end method rollback

    /// Copy of the current entry for `sid`.
    pub fn entry(&self, sid: ItemId) -> Option<LocalStockEntry> {
        self.entries.get(&sid).map(|entry| *entry)
    }

    /// Drop the entry for `sid` once its sale has ended.
    pub fn remove(&self, sid: ItemId) -> Option<LocalStockEntry> {
        self.entries.remove(&sid).map(|(_, entry)| entry)
    }

    /// Number of registered items.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no item is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
} // end of impl
