//! Delivery log validation throughput benchmarks.

use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use bcast_harness::membership::ring_dependencies;
use bcast_harness::participant::ParticipantId;
use bcast_harness::validate::{check_fifo_log, BroadcastValidation, CausalValidator, RunLayout};

/// Log of a participant that broadcast `messages` and delivered every
/// sender's messages round-robin.
fn synthetic_log(processes: u32, messages: u64) -> String {
    let mut log = String::new();
    for seq in 1..=messages {
        log.push_str(&format!("b {}\n", seq));
        for sender in 1..=processes {
            log.push_str(&format!("d {} {}\n", sender, seq));
        }
    }
    log
}

fn bench_fifo(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_fifo_log");

    for messages in [100u64, 1_000, 10_000] {
        let log = synthetic_log(10, messages);
        let lines = log.lines().count() as u64;

        group.throughput(Throughput::Elements(lines));
        group.bench_with_input(BenchmarkId::new("messages", messages), &log, |b, log| {
            b.iter(|| check_fifo_log(Path::new("proc01.output"), black_box(log)))
        });
    }

    group.finish();
}

fn bench_causal(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_causal_process");
    let processes = 5;

    for messages in [100u64, 1_000] {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = synthetic_log(processes, messages);
        for id in ParticipantId::all(processes) {
            std::fs::write(id.output_path(dir.path()), &log).expect("write log");
        }
        let layout = RunLayout::new(processes, messages, dir.path()).expect("layout");
        let deps = ring_dependencies(processes, 2).expect("ring");
        let validator = CausalValidator::new(layout, deps).expect("validator");

        group.throughput(Throughput::Elements(log.lines().count() as u64));
        group.bench_function(BenchmarkId::new("messages", messages), |b| {
            b.iter(|| validator.check_process(black_box(ParticipantId(1))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fifo, bench_causal);
criterion_main!(benches);
