use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use pipebench::testing::FakeExecutor;
use pipebench::{BatchBuilder, LoadRunner};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

fn benchmark_batch_builder(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_builder");
    group.throughput(Throughput::Elements(1));

    group.bench_function("build_at", |b| {
        let mut builder = BatchBuilder::new(999);
        let mut ts = 1_700_000_000_000_000_000u128;

        b.iter(|| {
            ts += 1;
            let batch = builder.build_at(black_box(ts));
            black_box(batch.operations())[3].key().len()
        });
    });

    group.bench_function("next_batch", |b| {
        let mut builder = BatchBuilder::new(999);

        b.iter(|| black_box(builder.next_batch().scalar_key().len()));
    });

    group.finish();
}

fn benchmark_runner_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("runner_overhead");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(5));

    let runtime = tokio::runtime::Runtime::new().unwrap();

    for workers in [10usize, 100, 1000] {
        group.bench_function(format!("{workers}_workers_10ms"), |b| {
            b.iter(|| {
                runtime.block_on(async {
                    let fake = Arc::new(FakeExecutor::succeeding());
                    let summary = LoadRunner::new(workers, Duration::from_millis(10))
                        .run(fake)
                        .await;
                    black_box(summary.attempted)
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_batch_builder, benchmark_runner_overhead);
criterion_main!(benches);
