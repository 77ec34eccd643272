use std::{
    sync::{Arc, Barrier},
    thread,
    time::Duration,
};

use super::{
    faulty_store::{Fault, FaultyStore},
    runtime,
};
use crate::{
    AuthoritativeDecrement, DistributedLock, FlashStockError, ItemId, LockOptions,
    MemoryStockStore, Stock, StockCoordinator, StockCoordinatorOptions, StockStore, StoreKey,
};

fn coordinator<S: StockStore>(store: Arc<S>) -> StockCoordinator<S> {
    StockCoordinator::new(store, StockCoordinatorOptions::default()).unwrap()
}

/// Proves the item's lock is free by taking it with a foreign handle.
async fn assert_lock_free<S: StockStore>(store: Arc<S>, name: &str) {
    let foreign = DistributedLock::new(
        store,
        LockOptions {
            acquire_timeout_ms: 20,
            ..Default::default()
        },
    )
    .unwrap();

    let hold = foreign.acquire(name).await.expect("lock should be free");
    foreign.release(hold).await.unwrap();
}

#[test]
fn warm_up_seeds_count_and_zero_sale() {
    runtime::block_on(async {
        let store = Arc::new(MemoryStockStore::new());
        let coordinator = coordinator(store.clone());
        let sid = ItemId::new(3);

        store.set("flashstock:3:sale", 17).await.unwrap();
        coordinator.warm_up(sid, 100).await.unwrap();

        assert_eq!(store.get("flashstock:3:count").await.unwrap(), 100);
        assert_eq!(store.get("flashstock:3:sale").await.unwrap(), 0);
        assert_eq!(
            coordinator.snapshot(sid).await.unwrap(),
            Stock {
                id: sid,
                count: 100,
                sale: 0
            }
        );
    });
}

#[test]
fn warm_up_rejects_counts_beyond_signed_range() {
    runtime::block_on(async {
        let coordinator = coordinator(Arc::new(MemoryStockStore::new()));

        let err = coordinator
            .warm_up(ItemId::new(1), i64::MAX as u64 + 1)
            .await
            .unwrap_err();

        assert!(matches!(err, FlashStockError::InvalidStockCount(_)));
        assert!(!err.is_transient());
    });
}

#[test]
fn custom_prefix_namespaces_keys() {
    runtime::block_on(async {
        let store = Arc::new(MemoryStockStore::new());
        let coordinator = StockCoordinator::new(
            store.clone(),
            StockCoordinatorOptions {
                prefix: Some(StoreKey::try_from("shop".to_string()).unwrap()),
                ..Default::default()
            },
        )
        .unwrap();

        coordinator.warm_up(ItemId::new(7), 2).await.unwrap();

        assert_eq!(store.get("shop:7:count").await.unwrap(), 2);
        assert_eq!(&*coordinator.lock_name(ItemId::new(7)), "shop:7:lock");
    });
}

#[test]
fn decrement_moves_one_unit_from_count_to_sale() {
    runtime::block_on(async {
        let coordinator = coordinator(Arc::new(MemoryStockStore::new()));
        let sid = ItemId::new(1);
        coordinator.warm_up(sid, 2).await.unwrap();

        assert_eq!(
            coordinator.decrement_authoritative(sid).await.unwrap(),
            AuthoritativeDecrement::Sold(Stock {
                id: sid,
                count: 1,
                sale: 1
            })
        );
        assert_eq!(
            coordinator.decrement_authoritative(sid).await.unwrap(),
            AuthoritativeDecrement::Sold(Stock {
                id: sid,
                count: 0,
                sale: 2
            })
        );
        assert_eq!(
            coordinator.decrement_authoritative(sid).await.unwrap(),
            AuthoritativeDecrement::Exhausted
        );

        assert_eq!(
            coordinator.snapshot(sid).await.unwrap(),
            Stock {
                id: sid,
                count: 0,
                sale: 2
            }
        );
        assert_lock_free(coordinator.store().clone(), &coordinator.lock_name(sid)).await;
    });
}

#[test]
fn unknown_item_is_exhausted() {
    runtime::block_on(async {
        let coordinator = coordinator(Arc::new(MemoryStockStore::new()));

        assert_eq!(
            coordinator
                .decrement_authoritative(ItemId::new(404))
                .await
                .unwrap(),
            AuthoritativeDecrement::Exhausted
        );
    });
}

#[test]
fn last_unit_goes_to_exactly_one_of_two_racers() {
    let store = Arc::new(MemoryStockStore::new());
    let coordinator = Arc::new(coordinator(store));
    let sid = ItemId::new(1);

    runtime::block_on(coordinator.warm_up(sid, 1)).unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let coordinator = coordinator.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                runtime::block_on(coordinator.decrement_authoritative(sid)).unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let sold: Vec<_> = results
        .iter()
        .filter_map(|r| match r {
            AuthoritativeDecrement::Sold(stock) => Some(*stock),
            AuthoritativeDecrement::Exhausted => None,
        })
        .collect();

    assert_eq!(
        sold,
        vec![Stock {
            id: sid,
            count: 0,
            sale: 1
        }]
    );
    assert_eq!(
        runtime::block_on(coordinator.snapshot(sid)).unwrap(),
        Stock {
            id: sid,
            count: 0,
            sale: 1
        }
    );
}

#[test]
fn concurrent_decrements_never_oversell() {
    let coordinator = Arc::new(coordinator(Arc::new(MemoryStockStore::new())));
    let sid = ItemId::new(1);
    let stock = 50;

    runtime::block_on(coordinator.warm_up(sid, stock)).unwrap();

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let coordinator = coordinator.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                runtime::block_on(async {
                    let mut sold = 0u64;
                    for _ in 0..10 {
                        if let AuthoritativeDecrement::Sold(s) =
                            coordinator.decrement_authoritative(sid).await.unwrap()
                        {
                            assert_eq!(s.count + s.sale, stock);
                            sold += 1;
                        }
                    }
                    sold
                })
            })
        })
        .collect();

    let sold: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(sold, stock);
    assert_eq!(
        runtime::block_on(coordinator.snapshot(sid)).unwrap(),
        Stock {
            id: sid,
            count: 0,
            sale: stock
        }
    );
}

#[test]
fn read_failure_is_unavailable_and_releases_the_lock() {
    runtime::block_on(async {
        let store = Arc::new(FaultyStore::new());
        let coordinator = coordinator(store.clone());
        let sid = ItemId::new(1);
        coordinator.warm_up(sid, 5).await.unwrap();

        store.fail_on(Fault::Get, ":count");

        let err = coordinator.decrement_authoritative(sid).await.unwrap_err();
        assert!(matches!(err, FlashStockError::StoreUnavailable(_)));

        store.heal();
        assert_lock_free(store.clone(), &coordinator.lock_name(sid)).await;
        assert_eq!(coordinator.snapshot(sid).await.unwrap().count, 5);
    });
}

#[test]
fn failed_sale_increment_restores_count() {
    runtime::block_on(async {
        let store = Arc::new(FaultyStore::new());
        let coordinator = coordinator(store.clone());
        let sid = ItemId::new(1);
        coordinator.warm_up(sid, 5).await.unwrap();

        store.fail_on(Fault::Increment, ":sale");

        let err = coordinator.decrement_authoritative(sid).await.unwrap_err();
        assert!(err.is_transient());

        store.heal();
        assert_eq!(
            coordinator.snapshot(sid).await.unwrap(),
            Stock {
                id: sid,
                count: 5,
                sale: 0
            }
        );
        assert_lock_free(store, &coordinator.lock_name(sid)).await;
    });
}

#[test]
fn dropped_decrement_finishes_and_releases_the_lock() {
    runtime::block_on(async {
        let store = Arc::new(FaultyStore::new());
        let coordinator = coordinator(store.clone());
        let sid = ItemId::new(1);
        coordinator.warm_up(sid, 5).await.unwrap();

        store.stall_on(Fault::Increment, ":sale");

        let attempt = runtime::timeout(
            Duration::from_millis(50),
            coordinator.decrement_authoritative(sid),
        )
        .await;
        assert!(attempt.is_none());
        assert_eq!(store.inner().get("flashstock:1:count").await.unwrap(), 4);

        store.heal();
        for _ in 0..2_000 {
            if coordinator.snapshot(sid).await.unwrap().sale == 1 {
                break;
            }
            runtime::async_sleep(Duration::from_millis(1)).await;
        }

        assert_eq!(
            coordinator.snapshot(sid).await.unwrap(),
            Stock {
                id: sid,
                count: 4,
                sale: 1
            }
        );

        let foreign = DistributedLock::new(
            store.clone(),
            LockOptions {
                acquire_timeout_ms: 2_000,
                ..Default::default()
            },
        )
        .unwrap();
        let hold = foreign
            .acquire(coordinator.lock_name(sid))
            .await
            .expect("lock should be released");
        foreign.release(hold).await.unwrap();
    });
}

#[test]
fn lock_failure_is_unavailable_and_touches_no_counter() {
    runtime::block_on(async {
        let store = Arc::new(FaultyStore::new());
        let coordinator = coordinator(store.clone());
        let sid = ItemId::new(1);
        coordinator.warm_up(sid, 5).await.unwrap();

        store.fail_on(Fault::Lock, "");
        store.fail_on(Fault::Decrement, "");

        let err = coordinator.decrement_authoritative(sid).await.unwrap_err();
        assert!(matches!(err, FlashStockError::StoreUnavailable(_)));

        assert_eq!(store.inner().get("flashstock:1:count").await.unwrap(), 5);
    });
}

#[test]
fn held_lock_times_out_without_changing_stock() {
    runtime::block_on(async {
        let store = Arc::new(MemoryStockStore::new());
        let coordinator = StockCoordinator::new(
            store.clone(),
            StockCoordinatorOptions {
                lock: LockOptions {
                    acquire_timeout_ms: 50,
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .unwrap();
        let sid = ItemId::new(1);
        coordinator.warm_up(sid, 5).await.unwrap();

        let hold = coordinator
            .lock()
            .acquire(coordinator.lock_name(sid))
            .await
            .unwrap();

        let err = coordinator.decrement_authoritative(sid).await.unwrap_err();
        assert!(matches!(err, FlashStockError::LockTimeout { timeout_ms: 50, .. }));

        coordinator.lock().release(hold).await.unwrap();

        assert_eq!(coordinator.snapshot(sid).await.unwrap().count, 5);
        assert!(matches!(
            coordinator.decrement_authoritative(sid).await.unwrap(),
            AuthoritativeDecrement::Sold(Stock { count: 4, sale: 1, .. })
        ));
    });
}

#[test]
fn clear_deletes_the_record() {
    runtime::block_on(async {
        let store = Arc::new(MemoryStockStore::new());
        let coordinator = coordinator(store.clone());
        let sid = ItemId::new(1);

        coordinator.warm_up(sid, 5).await.unwrap();
        assert!(coordinator.clear(sid).await.unwrap());
        assert!(!coordinator.clear(sid).await.unwrap());

        assert!(store.is_empty());
        assert_eq!(
            coordinator.decrement_authoritative(sid).await.unwrap(),
            AuthoritativeDecrement::Exhausted
        );
    });
}
