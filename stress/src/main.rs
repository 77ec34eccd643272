use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use tracing_subscriber::EnvFilter;

use flashstock::{
    BufferRatio, FlashSale, FlashSaleOptions, FlashStockError, ItemId, LocalStockLedgerOptions,
    LockOptions, MemoryStockStore, PurchaseDecision, RefillIntervalMs, SoldOutReason,
    StockCoordinatorOptions, StockStore, StoreKey, TokenBucketOptions, TokenCapacity,
};

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Store {
    /// In-process store.
    Memory,
    /// Redis store (requires the `redis-tokio` feature).
    Redis,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ItemDist {
    /// Every buyer wants item 0.
    Hot,
    /// Buyers pick items uniformly.
    Uniform,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "flashstock-stress",
    about = "Load test harness for the flashstock purchase pipeline"
)]
struct Args {
    #[arg(long, value_enum, default_value_t = Store::Memory)]
    store: Store,

    #[arg(long, value_enum, default_value_t = ItemDist::Uniform)]
    item_dist: ItemDist,

    /// Concurrent buyer tasks.
    #[arg(long, default_value_t = 8)]
    threads: usize,

    #[arg(long, default_value_t = 10)]
    duration_s: u64,

    #[arg(long, default_value_t = 4)]
    items: u64,

    #[arg(long, default_value_t = 10_000)]
    stock_per_item: u64,

    #[arg(long, default_value_t = 5_000)]
    bucket_capacity: u64,

    #[arg(long, default_value_t = 500)]
    bucket_initial: u64,

    #[arg(long, default_value_t = 1)]
    refill_interval_ms: u64,

    #[arg(long, default_value_t = 0.03)]
    buffer_ratio: f64,

    #[arg(long, default_value_t = 3_000)]
    lock_timeout_ms: u64,

    #[arg(long, default_value_t = 100)]
    sample_every: u64,

    #[arg(long, default_value = "redis://127.0.0.1:16379/")]
    redis_url: String,

    #[arg(long, default_value = "stress")]
    redis_prefix: String,
}

#[derive(Default)]
struct Counts {
    sold: AtomicU64,
    local_sold_out: AtomicU64,
    authoritative_sold_out: AtomicU64,
    rate_limited: AtomicU64,
    lock_timeouts: AtomicU64,
    store_errors: AtomicU64,
}

fn build_options(args: &Args) -> Result<FlashSaleOptions, FlashStockError> {
    Ok(FlashSaleOptions {
        token_bucket: TokenBucketOptions {
            capacity: TokenCapacity::try_from(args.bucket_capacity)?,
            initial_tokens: args.bucket_initial,
            refill_interval_ms: RefillIntervalMs::try_from(args.refill_interval_ms)?,
        },
        ledger: LocalStockLedgerOptions {
            buffer_ratio: BufferRatio::try_from(args.buffer_ratio)?,
        },
        coordinator: StockCoordinatorOptions {
            prefix: Some(StoreKey::try_from(args.redis_prefix.clone())?),
            lock: LockOptions {
                acquire_timeout_ms: args.lock_timeout_ms,
                ..Default::default()
            },
        },
    })
}

fn should_sample(iter: u64, sample_every: u64) -> bool {
    if sample_every <= 1 {
        return true;
    }

    iter.is_multiple_of(sample_every)
}

fn print_results(args: &Args, elapsed: Duration, hist: &Histogram<u64>, counts: &Counts) {
    let sold = counts.sold.load(Ordering::Relaxed);
    let local_sold_out = counts.local_sold_out.load(Ordering::Relaxed);
    let authoritative_sold_out = counts.authoritative_sold_out.load(Ordering::Relaxed);
    let rate_limited = counts.rate_limited.load(Ordering::Relaxed);
    let lock_timeouts = counts.lock_timeouts.load(Ordering::Relaxed);
    let store_errors = counts.store_errors.load(Ordering::Relaxed);
    let ops = sold
        + local_sold_out
        + authoritative_sold_out
        + rate_limited
        + lock_timeouts
        + store_errors;

    println!(
        "store={:?} item_dist={:?} threads={} items={} stock_per_item={}",
        args.store, args.item_dist, args.threads, args.items, args.stock_per_item
    );
    println!(
        "elapsed_s={:.3} ops={} ops_per_s={:.0}",
        elapsed.as_secs_f64(),
        ops,
        ops as f64 / elapsed.as_secs_f64()
    );
    println!(
        "sold={sold} local_sold_out={local_sold_out} authoritative_sold_out={authoritative_sold_out} rate_limited={rate_limited} lock_timeouts={lock_timeouts} store_errors={store_errors}"
    );
    if !hist.is_empty() {
        println!(
            "lat_us p50={} p95={} p99={} p999={} max={}",
            hist.value_at_quantile(0.50),
            hist.value_at_quantile(0.95),
            hist.value_at_quantile(0.99),
            hist.value_at_quantile(0.999),
            hist.max()
        );
        println!("sample_every={} samples={}", args.sample_every, hist.len());
    } else {
        println!("no latency samples collected");
    }
}

/// Drives buyers against `sale` for the configured duration, then checks that nothing
/// was oversold. Returns whether every item passed.
async fn run<S: StockStore>(args: Args, sale: Arc<FlashSale<S>>) -> bool {
    for item in 0..args.items {
        if let Err(err) = sale.setup(ItemId::new(item), args.stock_per_item).await {
            tracing::error!(item, error = %err, "setup failed");
            return false;
        }
    }

    sale.run_refill_loop();

    let stop = Arc::new(AtomicBool::new(false));
    let counts = Arc::new(Counts::default());
    let sold_per_item: Arc<Vec<AtomicU64>> =
        Arc::new((0..args.items).map(|_| AtomicU64::new(0)).collect());

    let started = Instant::now();
    let deadline = started + Duration::from_secs(args.duration_s);

    let mut join = Vec::with_capacity(args.threads);
    for t in 0..args.threads {
        let sale = Arc::clone(&sale);
        let stop = Arc::clone(&stop);
        let counts = Arc::clone(&counts);
        let sold_per_item = Arc::clone(&sold_per_item);
        let args = args.clone();

        join.push(tokio::spawn(async move {
            let mut hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
            let mut i = 0_u64;
            let mut seed = (t as u64 + 1) * 0x9E37_79B9_7F4A_7C15;

            let mut rng_u64 = || {
                // xorshift64*
                seed ^= seed >> 12;
                seed ^= seed << 25;
                seed ^= seed >> 27;
                seed = seed.wrapping_mul(0x2545_F491_4F6C_DD1D);
                seed
            };

            while !stop.load(Ordering::Relaxed) && Instant::now() < deadline {
                i = i.wrapping_add(1);

                let item = match args.item_dist {
                    ItemDist::Hot => 0,
                    ItemDist::Uniform => rng_u64() % args.items,
                };

                let t0 = should_sample(i, args.sample_every).then(Instant::now);
                let result = sale.attempt_purchase(ItemId::new(item)).await;

                if let Some(t0) = t0 {
                    let us = t0.elapsed().as_micros() as u64;
                    let _ = hist.record(us.max(1));
                }

                match result {
                    Ok(PurchaseDecision::Sold(_)) => {
                        counts.sold.fetch_add(1, Ordering::Relaxed);
                        sold_per_item[item as usize].fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(PurchaseDecision::SoldOut(SoldOutReason::LocalExhausted)) => {
                        counts.local_sold_out.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(PurchaseDecision::SoldOut(SoldOutReason::AuthoritativeExhausted)) => {
                        counts.authoritative_sold_out.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(PurchaseDecision::RateLimited) => {
                        counts.rate_limited.fetch_add(1, Ordering::Relaxed);
                        // let the refill loop catch up instead of spinning
                        tokio::task::yield_now().await;
                    }
                    Err(FlashStockError::LockTimeout { .. }) => {
                        counts.lock_timeouts.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(_) => {
                        counts.store_errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }

            hist
        }));
    }

    tokio::time::sleep(Duration::from_secs(args.duration_s)).await;
    stop.store(true, Ordering::Relaxed);

    let mut merged = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
    for j in join {
        let hist = j.await.unwrap();
        merged.add(&hist).unwrap();
    }

    sale.stop_refill_loop();

    let elapsed = started.elapsed();
    print_results(&args, elapsed, &merged, &counts);

    let mut ok = true;
    for item in 0..args.items {
        let sid = ItemId::new(item);
        let sold = sold_per_item[item as usize].load(Ordering::Relaxed);

        match sale.coordinator().snapshot(sid).await {
            Ok(stock) => {
                let balanced = stock.count + stock.sale == args.stock_per_item;
                let matches = stock.sale == sold;
                println!(
                    "item={item} count={} sale={} sold_seen={sold} balanced={balanced} matches={matches}",
                    stock.count, stock.sale
                );
                ok &= balanced && matches;
            }
            Err(err) => {
                tracing::error!(item, error = %err, "snapshot failed");
                ok = false;
            }
        }

        if let Err(err) = sale.close_sale(sid).await {
            tracing::warn!(item, error = %err, "failed to clear item");
        }
    }

    ok
}

#[cfg(feature = "redis-tokio")]
async fn run_redis(args: Args, options: FlashSaleOptions) -> bool {
    use flashstock::{FlashStockRedisClient, RedisStockStore, RedisStockStoreOptions};

    let client = redis::Client::open(args.redis_url.as_str()).unwrap();
    let store = RedisStockStore::new(RedisStockStoreOptions {
        client: FlashStockRedisClient::from_client(client, args.threads.max(1))
            .await
            .unwrap(),
    });

    let sale = Arc::new(FlashSale::new(Arc::new(store), options).unwrap());
    run(args, sale).await
}

#[cfg(not(feature = "redis-tokio"))]
async fn run_redis(_: Args, _: FlashSaleOptions) -> bool {
    eprintln!("redis store requires: cargo run -p flashstock-stress --features redis-tokio -- ...");
    std::process::exit(2);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();

    if args.items == 0 {
        eprintln!("--items must be at least 1");
        std::process::exit(2);
    }

    let options = match build_options(&args) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("invalid arguments: {err}");
            std::process::exit(2);
        }
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(args.threads.max(2))
        .build()
        .unwrap();

    let ok = rt.block_on(async move {
        match args.store {
            Store::Memory => {
                let sale =
                    Arc::new(FlashSale::new(Arc::new(MemoryStockStore::new()), options).unwrap());
                run(args, sale).await
            }
            Store::Redis => run_redis(args, options).await,
        }
    });

    if !ok {
        eprintln!("stock invariant violated");
        std::process::exit(2);
    }
}
