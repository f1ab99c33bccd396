//! Projection and expiry planning benchmarks
//!
//! Balances are folded from the full history on every read, so these bound
//! the per-request cost for long-lived customers.

use chrono::{Duration, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use loyalty_ledger::{
    crypto, expiry, projection,
    types::{ChainHead, EntryType, LedgerEntry, UserId},
};
use std::hint::black_box;

/// History of `len` entries: mostly earns, every fourth a redemption
fn history(len: usize) -> Vec<LedgerEntry> {
    let user = UserId::new("bench-user");
    let created = Utc::now() - Duration::days(400);
    let mut head = ChainHead::GENESIS;

    (0..len)
        .map(|i| {
            let mut entry = if i % 4 == 3 {
                LedgerEntry::draft(user.clone(), EntryType::Redeem, -1_000, "redeem")
            } else {
                LedgerEntry::draft(user.clone(), EntryType::Earn, 500, "order")
                    .with_expiry(Some(created + Duration::days(365)))
            };
            entry.seal(head.sequence + 1, head.hash, created);
            head = ChainHead {
                sequence: entry.sequence,
                hash: entry.hash,
            };
            entry
        })
        .collect()
}

fn bench_project(c: &mut Criterion) {
    let mut group = c.benchmark_group("project");

    for len in [10usize, 100, 1_000, 10_000] {
        let entries = history(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &entries, |b, entries| {
            b.iter(|| projection::project(black_box(entries)))
        });
    }

    group.finish();
}

fn bench_expiry_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("expiry_plan");
    let now = Utc::now();

    for len in [100usize, 1_000] {
        let entries = history(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &entries, |b, entries| {
            b.iter(|| expiry::plan(black_box(entries), black_box(now)))
        });
    }

    group.finish();
}

fn bench_verify_chain(c: &mut Criterion) {
    let entries = history(1_000);
    c.bench_function("verify_chain_1000", |b| {
        b.iter(|| crypto::verify_chain(black_box(&entries)))
    });
}

criterion_group!(benches, bench_project, bench_expiry_plan, bench_verify_chain);
criterion_main!(benches);
