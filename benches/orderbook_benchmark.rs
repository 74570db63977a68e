//! Benchmarks for order book operations

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use depth_feed::orderbook::{OrderBook, Side};
use depth_feed::parser::{LevelChange, PriceLevel};
use rust_decimal::Decimal;
use std::str::FromStr;

fn create_levels(levels: usize, start: i64, step: i64) -> Vec<PriceLevel> {
    (0..levels as i64)
        .map(|i| PriceLevel {
            price: Decimal::new(start + i * step, 8),
            size: Decimal::from_str("1.5").unwrap(),
        })
        .collect()
}

fn create_book(levels: usize) -> OrderBook {
    let mut book = OrderBook::new("ETH-BTC");
    book.apply_snapshot(
        &create_levels(levels, 41_500, -3),
        &create_levels(levels, 41_600, 3),
    );
    book
}

fn create_changes() -> Vec<LevelChange> {
    vec![
        LevelChange {
            side: Some(Side::Bid),
            price: Decimal::new(41_497, 8),
            size: Decimal::from_str("2.0").unwrap(),
        },
        LevelChange {
            side: Some(Side::Ask),
            price: Decimal::new(41_603, 8),
            size: Decimal::ZERO,
        },
        LevelChange {
            side: Some(Side::Ask),
            price: Decimal::new(41_603, 8),
            size: Decimal::from_str("2.5").unwrap(),
        },
    ]
}

fn benchmark_apply_snapshot(c: &mut Criterion) {
    let bids = create_levels(1000, 41_500, -3);
    let asks = create_levels(1000, 41_600, 3);

    c.bench_function("apply_snapshot_1000_levels", |b| {
        b.iter(|| {
            let mut book = OrderBook::new("ETH-BTC");
            book.apply_snapshot(black_box(&bids), black_box(&asks));
        })
    });
}

fn benchmark_apply_diff(c: &mut Criterion) {
    let mut book = create_book(1000);
    let changes = create_changes();

    c.bench_function("apply_diff", |b| {
        b.iter(|| {
            book.apply_diff(black_box(&changes));
        })
    });
}

fn benchmark_top_levels(c: &mut Criterion) {
    let book = create_book(1000);

    c.bench_function("top_levels_20_precision_5", |b| {
        b.iter(|| {
            black_box(book.top_levels(Side::Bid, 20, 5));
        })
    });

    c.bench_function("top_levels_20_precision_8", |b| {
        b.iter(|| {
            black_box(book.top_levels(Side::Ask, 20, 8));
        })
    });
}

criterion_group!(
    benches,
    benchmark_apply_snapshot,
    benchmark_apply_diff,
    benchmark_top_levels
);
criterion_main!(benches);
