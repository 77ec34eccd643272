use criterion::{Criterion, criterion_group, criterion_main};

#[cfg(feature = "redis-tokio")]
mod enabled {
    use std::{env, hint::black_box, sync::Arc, time::Duration};

    use criterion::Criterion;

    use flashstock::{
        FlashSale, FlashSaleOptions, FlashStockRedisClient, ItemId, RedisStockStore,
        RedisStockStoreOptions, StockCoordinatorOptions, StoreKey, TokenBucketOptions,
        TokenCapacity,
    };

    fn redis_url() -> String {
        env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:16379/".to_string())
    }

    pub fn bench_attempt_purchase(c: &mut Criterion) {
        let mut group = c.benchmark_group("redis/attempt_purchase");
        group.sample_size(50);

        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .worker_threads(2)
            .build()
            .unwrap();

        let sale = rt.block_on(async {
            let client = redis::Client::open(redis_url()).unwrap();

            Arc::new(
                FlashSale::new(
                    Arc::new(RedisStockStore::new(RedisStockStoreOptions {
                        client: FlashStockRedisClient::from_client(client, 2).await.unwrap(),
                    })),
                    FlashSaleOptions {
                        token_bucket: TokenBucketOptions {
                            capacity: TokenCapacity::try_from(u64::MAX).unwrap(),
                            initial_tokens: u64::MAX,
                            ..Default::default()
                        },
                        coordinator: StockCoordinatorOptions {
                            prefix: Some(StoreKey::try_from("bench".to_string()).unwrap()),
                            ..Default::default()
                        },
                        ..Default::default()
                    },
                )
                .unwrap(),
            )
        });

        let in_stock = ItemId::new(1);
        let sold_out = ItemId::new(2);

        rt.block_on(async {
            sale.setup(in_stock, i64::MAX as u64).await.unwrap();
            sale.setup(sold_out, 0).await.unwrap();
        });

        group.bench_function("sold", |b| {
            b.iter(|| {
                rt.block_on(async { black_box(sale.attempt_purchase(black_box(in_stock)).await) })
            });
        });

        group.bench_function("local_sold_out", |b| {
            b.iter(|| {
                rt.block_on(async { black_box(sale.attempt_purchase(black_box(sold_out)).await) })
            });
        });

        rt.block_on(async {
            sale.close_sale(in_stock).await.unwrap();
            sale.close_sale(sold_out).await.unwrap();
        });

        // Give outstanding IO a moment before runtime drop.
        std::thread::sleep(Duration::from_millis(50));
        group.finish();
    }
}

#[cfg(feature = "redis-tokio")]
fn bench_attempt_purchase(c: &mut Criterion) {
    enabled::bench_attempt_purchase(c)
}

#[cfg(not(feature = "redis-tokio"))]
fn bench_attempt_purchase(_: &mut Criterion) {}

criterion_group!(benches, bench_attempt_purchase);
criterion_main!(benches);
