use ccbell_monitor::monitor::diff;
use ccbell_monitor::models::{EntityId, EntityState, Snapshot};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn snapshot(entities: usize, offset: usize) -> Snapshot {
    (offset..offset + entities)
        .map(|i| {
            let status = if i % 7 == 0 { "degraded" } else { "online" };
            (
                EntityId::new(format!("entity-{i:06}")),
                EntityState::new(status).with_metric("temp", (i % 100) as f64),
            )
        })
        .collect()
}

/// Diff of identical snapshots (the common steady-state tick)
fn bench_diff_unchanged(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_unchanged");

    for size in [10, 100, 1_000, 10_000].iter() {
        let previous = snapshot(*size, 0);
        let current = previous.clone();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(diff(&previous, &current)));
        });
    }
    group.finish();
}

/// Diff where a tenth of the entities were replaced
fn bench_diff_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_churn");

    for size in [10, 100, 1_000, 10_000].iter() {
        let previous = snapshot(*size, 0);
        let current = snapshot(*size, *size / 10);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(diff(&previous, &current)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_diff_unchanged, bench_diff_churn);
criterion_main!(benches);
