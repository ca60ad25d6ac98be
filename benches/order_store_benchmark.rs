//! Benchmarks for order store and orderbook cache operations

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use orp_flow_exchange_gateway::{
    MarketOrder, Order, OrderId, OrderStatus, OrderStore, OrderType, OrderbookCache,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use tokio::runtime::Runtime;

fn create_levels(levels: usize, base: i64, step: i64) -> Vec<MarketOrder> {
    (0..levels as i64)
        .map(|i| {
            MarketOrder::new(
                Decimal::from(base + i * step),
                Decimal::from_str("1.5").unwrap(),
            )
        })
        .collect()
}

fn create_order(id: i64) -> Order {
    Order::new(
        OrderId::new(id),
        "BTC/USDT",
        OrderType::Buy,
        Decimal::from(50000),
        Decimal::from(2),
    )
}

fn benchmark_push(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("push_1000_orders", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = OrderStore::new();
                for id in 1..=1000 {
                    store.push(black_box(create_order(id))).await.unwrap();
                }
            })
        })
    });
}

fn benchmark_update_and_lookup(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = OrderStore::new();
    rt.block_on(async {
        for id in 1..=1000 {
            store.push(create_order(id)).await.unwrap();
        }
    });

    let partial = create_order(500).with_status(OrderStatus::Partial);

    c.bench_function("update_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(store.update_order(partial.clone()).await.unwrap());
            })
        })
    });

    c.bench_function("get_order_info", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(store.get_order_info(OrderId::new(750)).await.unwrap());
            })
        })
    });
}

fn benchmark_cache(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = OrderbookCache::in_memory();
    let bids = create_levels(100, 50000, -1);
    let asks = create_levels(100, 50001, 1);

    c.bench_function("cache_update_100_levels", |b| {
        b.iter(|| {
            rt.block_on(async {
                cache
                    .update("BTC/USDT", black_box(bids.clone()), black_box(asks.clone()))
                    .await
                    .unwrap();
            })
        })
    });

    c.bench_function("cache_get_and_metrics", |b| {
        b.iter(|| {
            rt.block_on(async {
                let record = cache.get("btc_usdt").await.unwrap();
                black_box(record.metrics());
            })
        })
    });
}

criterion_group!(
    benches,
    benchmark_push,
    benchmark_update_and_lookup,
    benchmark_cache
);
criterion_main!(benches);
