//! Top-level entrypoint that wires the admission pipeline.
//!
//! [`FlashSale`] is the explicit context object a service builds once at startup and
//! shares (usually behind an `Arc`) with its request handlers. It owns the token
//! bucket, the local stock ledger and the distributed coordinator, and drives the
//! bucket's refill loop.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use crate::{
    AuthoritativeDecrement, FlashStockError, ItemId, LocalDecrement, LocalStockLedger,
    LocalStockLedgerOptions, PurchaseDecision, SoldOutReason, StockCoordinator,
    StockCoordinatorOptions, StockStore, TokenBucket, TokenBucketOptions, runtime,
};

/// Top-level configuration for [`FlashSale`].
#[derive(Clone, Debug, Default)]
pub struct FlashSaleOptions {
    /// Admission gate.
    pub token_bucket: TokenBucketOptions,
    /// Local two-tier stock.
    pub ledger: LocalStockLedgerOptions,
    /// Shared store keys and lock behaviour.
    pub coordinator: StockCoordinatorOptions,
}

struct RefillLoop {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Flash-sale admission pipeline.
///
/// Every purchase attempt flows through three stages:
///
/// 1. **Token bucket**: no token, no further work ([`PurchaseDecision::RateLimited`])
/// 2. **Local ledger**: both local tiers empty means sold out without touching the
///    shared store ([`SoldOutReason::LocalExhausted`])
/// 3. **Coordinator**: the shared store confirms the sale under the item's lock. If it
///    does not (sold out, lock timeout, store outage) the local unit is given back
///
/// Stage 3 and the local settlement run on a detached task. Dropping the purchase
/// future only stops the wait: the task still finishes the store round trip, keeps the
/// local unit if the store recorded the sale and gives it back otherwise.
///
/// With the `tokio` feature alone, purchases must be attempted inside a tokio runtime.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use flashstock::{
///     FlashSale, FlashSaleOptions, FlashStockError, ItemId, MemoryStockStore, PurchaseDecision,
/// };
///
/// async fn run() -> Result<(), FlashStockError> {
///     let sale = Arc::new(FlashSale::new(
///         Arc::new(MemoryStockStore::new()),
///         FlashSaleOptions::default(),
///     )?);
///     sale.run_refill_loop();
///
///     let sid = ItemId::new(1);
///     sale.setup(sid, 100).await?;
///
///     match sale.attempt_purchase(sid).await {
///         Ok(PurchaseDecision::Sold(stock)) => println!("sold, {} left", stock.count),
///         Ok(PurchaseDecision::SoldOut(_)) => println!("sold out"),
///         Ok(PurchaseDecision::RateLimited) => println!("busy, try again"),
///         Err(err) if err.is_transient() => println!("temporarily unavailable: {err}"),
///         Err(err) => return Err(err),
///     }
///
///     Ok(())
/// }
/// ```
pub struct FlashSale<S: StockStore> {
    token_bucket: Arc<TokenBucket>,
    ledger: Arc<LocalStockLedger>,
    coordinator: StockCoordinator<S>,
    refill_loop: Mutex<Option<RefillLoop>>,
}

impl<S: StockStore> FlashSale<S> {
    /// Create a new pipeline over `store`. The refill loop is not started.
    pub fn new(store: Arc<S>, options: FlashSaleOptions) -> Result<Self, FlashStockError> {
        Ok(Self {
            token_bucket: Arc::new(TokenBucket::new(options.token_bucket)?),
            ledger: Arc::new(LocalStockLedger::new(options.ledger)),
            coordinator: StockCoordinator::new(store, options.coordinator)?,
            refill_loop: Mutex::new(None),
        })
    } // end constructor

    /// Access the token bucket.
    pub fn token_bucket(&self) -> &TokenBucket {
        &self.token_bucket
    }

    /// Access the local stock ledger.
    pub fn ledger(&self) -> &LocalStockLedger {
        &self.ledger
    }

    /// Access the distributed coordinator.
    pub fn coordinator(&self) -> &StockCoordinator<S> {
        &self.coordinator
    }

    /// Register `sid` for sale: warm the authoritative record (`count = initial_count`,
    /// `sale = 0`), then seed the local tiers.
    pub async fn setup(&self, sid: ItemId, initial_count: u64) -> Result<(), FlashStockError> {
        self.coordinator.warm_up(sid, initial_count).await?;
        self.ledger.register_item(sid, initial_count);

        tracing::info!(sid = %sid, initial_count, "flash sale item set up");

        Ok(())
    } // end method setup

    /// End the sale of `sid`: drop its local entry and delete its authoritative record.
    pub async fn close_sale(&self, sid: ItemId) -> Result<(), FlashStockError> {
        self.ledger.remove(sid);
        self.coordinator.clear(sid).await?;

        tracing::info!(sid = %sid, "flash sale item closed");

        Ok(())
    } // end method close_sale

    /// Decide one purchase of `sid`.
    ///
    /// # Returns
    ///
    /// - `Ok(`[`PurchaseDecision::Sold`]`)`: the unit is sold; carries the authoritative
    ///   state after the decrement
    /// - `Ok(`[`PurchaseDecision::SoldOut`]`)`: no stock, locally or authoritatively
    /// - `Ok(`[`PurchaseDecision::RateLimited`]`)`: no admission token
    /// - `Err(`[`FlashStockError::LockTimeout`]` | `[`FlashStockError::StoreUnavailable`]`)`:
    ///   transient failure, nothing was sold and the caller may retry
    pub async fn attempt_purchase(&self, sid: ItemId) -> Result<PurchaseDecision, FlashStockError> {
        if !self.token_bucket.acquire_token() {
            return Ok(PurchaseDecision::RateLimited);
        }

        let hit = self.ledger.try_decrement(sid);
        if hit == LocalDecrement::Exhausted {
            return Ok(PurchaseDecision::SoldOut(SoldOutReason::LocalExhausted));
        }

        let rollback = LocalRollback {
            ledger: Arc::clone(&self.ledger),
            sid,
            hit,
            armed: true,
        };
        let coordinator = self.coordinator.clone();

        runtime::run_detached(async move {
            match coordinator.decrement_on_current_task(sid).await {
                Ok(AuthoritativeDecrement::Sold(stock)) => {
                    rollback.disarm();
                    Ok(PurchaseDecision::Sold(stock))
                }
                Ok(AuthoritativeDecrement::Exhausted) => {
                    drop(rollback);
                    Ok(PurchaseDecision::SoldOut(
                        SoldOutReason::AuthoritativeExhausted,
                    ))
                }
                Err(err) => {
                    drop(rollback);
                    Err(err)
                }
            }
        })
        .await?
    } // end method attempt_purchase

    /// Start the background refill loop at the configured interval.
    pub fn run_refill_loop(&self) {
        let interval = Duration::from_millis(*self.token_bucket.refill_interval_ms());
        self.run_refill_loop_with_interval(interval);
    }

    /// Start the background refill loop, adding one token every `interval`.
    ///
    /// Does nothing if a loop is already running.
    pub fn run_refill_loop_with_interval(&self, interval: Duration) {
        let mut refill_loop = self
            .refill_loop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if refill_loop.is_some() {
            return;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let token_bucket = Arc::clone(&self.token_bucket);
        let thread_stop = Arc::clone(&stop);

        let handle = std::thread::spawn(move || {
            while !thread_stop.load(Ordering::Relaxed) {
                std::thread::sleep(interval);

                if thread_stop.load(Ordering::Relaxed) {
                    break;
                }

                token_bucket.refill();
            }
        });

        tracing::debug!(interval_ms = interval.as_millis() as u64, "token refill loop started");

        *refill_loop = Some(RefillLoop { stop, handle });
    } // end method run_refill_loop_with_interval

    /// Stop the background refill loop and wait for it to exit. Idempotent.
    pub fn stop_refill_loop(&self) {
        let refill_loop = self
            .refill_loop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let Some(RefillLoop { stop, handle }) = refill_loop else {
            return;
        };

        stop.store(true, Ordering::Relaxed);

        if handle.join().is_err() {
            tracing::error!("token refill loop panicked");
        }

        tracing::debug!("token refill loop stopped");
    } // end method stop_refill_loop

    /// Whether the background refill loop is running.
    pub fn is_refill_loop_running(&self) -> bool {
        self.refill_loop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
} // end of impl

impl<S: StockStore> Drop for FlashSale<S> {
    fn drop(&mut self) {
        self.stop_refill_loop();
    }
}

/// Gives a locally taken unit back unless disarmed.
///
/// Runs on drop so the unit is also restored when the runtime drops the purchase task.
struct LocalRollback {
    ledger: Arc<LocalStockLedger>,
    sid: ItemId,
    hit: LocalDecrement,
    armed: bool,
}

impl LocalRollback {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LocalRollback {
    fn drop(&mut self) {
        if self.armed {
            self.ledger.rollback(self.sid, self.hit);
        }
    }
}
