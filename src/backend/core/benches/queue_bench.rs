//! Benchmarks for the task queue and worker pool.
//!
//! Run with: cargo bench

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

use taskhive_core::events::ListenerRegistry;
use taskhive_core::jobs::{Task, TaskOutcome, TaskQueue};
use taskhive_core::orchestrator::{WorkerPool, WorkerPoolConfig};

/// Enqueue `count` tasks with mixed priorities.
fn bench_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue");

    for count in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let queue = TaskQueue::default();
                for i in 0..count {
                    queue
                        .enqueue(Task::new("bench").with_priority((i % 10) as i64))
                        .unwrap();
                }
                black_box(queue.len())
            });
        });
    }
    group.finish();
}

/// Enqueue then drain through `dequeue_next` and `mark_result`.
fn bench_dequeue(c: &mut Criterion) {
    let mut group = c.benchmark_group("dequeue_next");

    for count in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter_batched(
                || {
                    let queue = TaskQueue::default();
                    for i in 0..count {
                        queue
                            .enqueue(Task::new("bench").with_priority((i % 10) as i64))
                            .unwrap();
                    }
                    queue
                },
                |queue| {
                    let now = Utc::now();
                    while let Some(task) = queue.dequeue_next(now) {
                        queue.mark_result(task.id, &TaskOutcome::Success, now).unwrap();
                    }
                    black_box(queue.is_empty())
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

/// Assign and complete a full cycle across a pool of workers.
fn bench_pool_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_cycle");

    for workers in [1, 8, 64].iter() {
        group.throughput(Throughput::Elements(*workers as u64));
        group.bench_with_input(BenchmarkId::from_parameter(workers), workers, |b, &workers| {
            let pool = WorkerPool::new(
                WorkerPoolConfig::default().with_max_workers(workers),
                Arc::new(TaskQueue::default()),
                Arc::new(ListenerRegistry::new()),
            );
            pool.add(workers).unwrap();

            b.iter(|| {
                for _ in 0..workers {
                    pool.submit(Task::new("bench")).unwrap();
                }
                for claimed in pool.assign_idle(Utc::now()) {
                    pool.complete_claim(claimed.worker_id, claimed.claim, TaskOutcome::Success)
                        .unwrap();
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_enqueue, bench_dequeue, bench_pool_cycle);
criterion_main!(benches);
