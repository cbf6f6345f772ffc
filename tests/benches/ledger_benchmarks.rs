//! # Points Ledger Benchmarks
//!
//! | Path | Contended rows |
//! |------|----------------|
//! | earn_reward_points | one RP balance |
//! | convert | RP + TBC balances, monthly window sum |
//! | purchase | RP + SH balances, event counter |
//! | history | log scan, newest-first sort |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::executor::block_on;
use ledger_core::{HistoryFilter, LedgerApi, LedgerConfig};
use ledger_tests::fixtures::{member, LedgerHarness};
use shared_types::{Currency, Metadata};

/// Enough RP and headroom that no iteration hits a cap.
const FUNDING: u64 = 100_000_000_000;

fn bench_earn(c: &mut Criterion) {
    let harness = LedgerHarness::new();
    let alice = member("alice");

    c.bench_function("earn_reward_points", |b| {
        b.iter(|| {
            block_on(harness.ledger.earn_reward_points(
                black_box(&alice),
                black_box(10),
                "contribution",
                Metadata::new(),
            ))
        })
    });
}

fn bench_convert(c: &mut Criterion) {
    let mut config = LedgerConfig::default();
    config.conversion.max_rp_per_month = FUNDING;
    let harness = LedgerHarness::with_config(config);
    let alice = member("alice");
    block_on(harness.fund_rp(&alice, FUNDING)).unwrap();

    c.bench_function("convert_100_rp", |b| {
        b.iter(|| block_on(harness.ledger.convert(black_box(&alice), 100)))
    });
}

fn bench_purchase(c: &mut Criterion) {
    let harness = LedgerHarness::new();
    let event = block_on(harness.open_event(FUNDING, FUNDING, 1)).unwrap();
    let alice = member("alice");
    block_on(harness.fund_rp(&alice, FUNDING)).unwrap();

    c.bench_function("purchase_1_sh", |b| {
        b.iter(|| block_on(harness.ledger.purchase(black_box(&alice), event.id, 1)))
    });
}

fn bench_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("transaction_history");

    for size in [100u64, 1_000, 10_000] {
        let harness = LedgerHarness::new();
        let alice = member("alice");
        for _ in 0..size {
            block_on(harness.fund_rp(&alice, 1)).unwrap();
        }

        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::new("first_page", size), &size, |b, _| {
            b.iter(|| {
                block_on(
                    harness
                        .ledger
                        .get_transaction_history(&alice, HistoryFilter::currency(Currency::Rp)),
                )
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_earn, bench_convert, bench_purchase, bench_history);
criterion_main!(benches);
