use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ledgerdo_core::config::ReconstructConfig;
use ledgerdo_core::event::{CreatedData, LedgerEvent, OrderingKey, UpdatedData};
use ledgerdo_core::ledger::MemoryLedger;
use ledgerdo_core::model::{Address, Priority, TaskId, from_unix_seconds};
use ledgerdo_core::reconstruct::{Reconstructor, SnapshotRequest, fold_events};
use std::sync::Arc;

#[derive(Clone, Copy, Debug)]
struct BenchmarkTier {
    name: &'static str,
    task_count: u64,
    event_count: u64,
}

const TIERS: [BenchmarkTier; 3] = [
    BenchmarkTier {
        name: "S",
        task_count: 100,
        event_count: 1_000,
    },
    BenchmarkTier {
        name: "M",
        task_count: 1_000,
        event_count: 20_000,
    },
    BenchmarkTier {
        name: "L",
        task_count: 10_000,
        event_count: 200_000,
    },
];

/// Deterministic log: every task is created first, then updates with a
/// sprinkling of deletions.
fn synthetic_log(tier: BenchmarkTier, seed: u64) -> Vec<LedgerEvent> {
    let mut state = seed;
    let mut next = move || {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        state >> 33
    };

    let mut events = Vec::with_capacity(tier.event_count as usize);
    for id in 1..=tier.task_count {
        events.push(LedgerEvent::created(
            OrderingKey::new(id, 0),
            TaskId::new(id),
            CreatedData {
                owner: Address::new("0xbench"),
                title: format!("task {id}"),
                priority: Priority::Medium,
                deadline: from_unix_seconds(1_800_000_000),
                ..CreatedData::default()
            },
        ));
    }
    for block in tier.task_count + 1..=tier.event_count {
        let id = TaskId::new(next() % tier.task_count + 1);
        let key = OrderingKey::new(block, 0);
        if next() % 50 == 0 {
            events.push(LedgerEvent::deleted(key, id));
        } else {
            events.push(LedgerEvent::updated(
                key,
                id,
                UpdatedData {
                    title: Some(format!("rev {block}")),
                    reward: Some(u128::from(next() % 1_000)),
                    ..UpdatedData::default()
                },
            ));
        }
    }
    events
}

fn bench_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("fold.tiered");
    for tier in TIERS {
        let mut log = synthetic_log(tier, 0xF01D ^ tier.event_count);
        // Arrival order should not matter; bench the reversed worst case too.
        group.throughput(Throughput::Elements(log.len() as u64));
        group.bench_with_input(BenchmarkId::new("key_order", tier.name), &log, |b, log| {
            b.iter(|| black_box(fold_events(log)));
        });
        log.reverse();
        group.bench_with_input(BenchmarkId::new("reversed", tier.name), &log, |b, log| {
            b.iter(|| black_box(fold_events(log)));
        });
    }
    group.finish();
}

fn bench_reconstruct(c: &mut Criterion) {
    let Ok(runtime) = tokio::runtime::Runtime::new() else {
        return;
    };
    let mut group = c.benchmark_group("reconstruct.memory");
    for tier in &TIERS[..2] {
        let ledger = Arc::new(MemoryLedger::new("0xbench"));
        for event in synthetic_log(*tier, 0xBEEF ^ tier.event_count) {
            ledger.inject_event(event);
        }
        let reconstructor = Reconstructor::new(ledger, ReconstructConfig::default());
        let request = SnapshotRequest::default();
        group.bench_function(BenchmarkId::new("full", tier.name), |b| {
            b.to_async(&runtime)
                .iter(|| async { black_box(reconstructor.reconstruct(&request).await) });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fold, bench_reconstruct);
criterion_main!(benches);
