//! Tagging Throughput Benchmark
//!
//! Measures per-batch cost of the timing blocks. Run with:
//!
//! ```bash
//! cargo bench -p r4w-timing --bench tagging_bench
//! ```
//!
//! This benchmark measures:
//! - Offset tagger throughput at dense and sparse marker intervals
//! - Retune scheduler work with a full pending queue
//! - Command handling cost for a burst of 64 timed commands

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use std::time::Duration;

use r4w_timing::stream_tags::TagValue;
use r4w_timing::types::IQSample;
use r4w_timing::{Flowgraph, OffsetTagger, RetuneScheduler, TimeSpec, UhdTagEmulator};

const RATE: f64 = 250_000.0;
const STREAM_LEN: usize = 65_536;

fn stream() -> Vec<IQSample> {
    (0..STREAM_LEN)
        .map(|i| IQSample::new((i as f64 * 0.01).cos(), (i as f64 * 0.01).sin()))
        .collect()
}

// ============================================================================
// Offset Tagger
// ============================================================================

fn bench_offset_tagger(c: &mut Criterion) {
    let mut group = c.benchmark_group("tagging/offset_tagger");
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(STREAM_LEN as u64));

    let input = stream();
    for interval in [1u64, 173, 4096] {
        group.bench_function(BenchmarkId::new("interval", interval), |b| {
            b.iter(|| {
                let mut fg = Flowgraph::new().with_batch_size(4096);
                fg.connect(UhdTagEmulator::new(1090e6, RATE, TimeSpec::new(0, 0.98765)))
                    .connect(OffsetTagger::new(RATE, interval, TimeSpec::new(0, 0.98765)));
                black_box(fg.run(black_box(&input)));
                black_box(fg.tags().len())
            });
        });
    }
    group.finish();
}

// ============================================================================
// Retune Scheduler
// ============================================================================

fn timed_command(i: usize) -> TagValue {
    TagValue::dict([
        ("lo_offset", TagValue::Float(i as f64 * 100.0)),
        ("time", TagValue::time_tuple(0, i as f64 / 64.0 * 0.25)),
    ])
}

fn bench_retune_scheduler(c: &mut Criterion) {
    let mut group = c.benchmark_group("tagging/retune_scheduler");
    group.throughput(Throughput::Elements(STREAM_LEN as u64));

    let input = stream();
    group.bench_function("full_queue", |b| {
        b.iter(|| {
            let scheduler = RetuneScheduler::new(RATE, "lo_offset", TimeSpec::default());
            for i in 0..64 {
                scheduler.handle_command(&timed_command(i));
            }
            let mut fg = Flowgraph::new().with_batch_size(1024);
            fg.connect(scheduler);
            black_box(fg.run(black_box(&input)));
            black_box(fg.tags().len())
        });
    });

    let commands: Vec<TagValue> = (0..64).map(timed_command).collect();
    group.throughput(Throughput::Elements(commands.len() as u64));
    group.bench_function("enqueue_64", |b| {
        b.iter_batched(
            || RetuneScheduler::new(RATE, "lo_offset", TimeSpec::default()),
            |scheduler| {
                for command in &commands {
                    scheduler.handle_command(black_box(command));
                }
                scheduler
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(
    name = offset_tagging;
    config = Criterion::default().sample_size(20);
    targets = bench_offset_tagger
);

criterion_group!(
    name = retune_scheduling;
    config = Criterion::default().sample_size(20);
    targets = bench_retune_scheduler
);

criterion_main!(offset_tagging, retune_scheduling);
