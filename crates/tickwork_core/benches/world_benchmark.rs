//! # World Tick Benchmark
//!
//! Measures the scheduling overhead of one `World::update` across many
//! systems, plus event fan-out through the dispatcher.
//!
//! Run with: `cargo bench --package tickwork_core`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tickwork_core::{Dispatcher, EntityAllocator, EntityId, System, SystemResult, World};

/// Minimal system: bumps a counter.
struct Counter {
    priority: i32,
    ticks: u64,
}

impl System for Counter {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn update(&mut self, dt: i64) -> SystemResult {
        self.ticks = self.ticks.wrapping_add(dt.unsigned_abs());
        Ok(())
    }

    fn remove(&mut self, _entity: EntityId) {}
}

fn build_world(count: usize) -> World {
    let mut world = World::new(|_| {});
    world.add((0..count).map(|i| {
        Box::new(Counter {
            priority: i32::try_from(i % 7).unwrap_or(0),
            ticks: 0,
        }) as Box<dyn System>
    }));
    world
}

/// Benchmark: one tick over N systems.
fn bench_world_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_update");

    for count in [8usize, 64, 512] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut world = build_world(count);
            b.iter(|| world.update(black_box(1)));
        });
    }

    group.finish();
}

/// Benchmark: batch entity allocation.
fn bench_entity_batches(c: &mut Criterion) {
    let ids = EntityAllocator::new();
    c.bench_function("entity_batch_1024", |b| {
        b.iter(|| black_box(ids.new_entities(1024)));
    });
}

/// Benchmark: dispatch to 32 subscribers.
fn bench_dispatch(c: &mut Criterion) {
    let mut events: Dispatcher<u64> = Dispatcher::new();
    for _ in 0..32 {
        events.subscribe("tick", |_, payload| {
            black_box(payload);
        });
    }

    c.bench_function("dispatch_32_subscribers", |b| {
        b.iter(|| events.dispatch("tick", black_box(&1)));
    });
}

criterion_group!(benches, bench_world_update, bench_entity_batches, bench_dispatch);
criterion_main!(benches);
