// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

/// Benchmark the memory-system models.
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use tessera_engine::engine::Engine;
use tessera_models::core_model::{CoreConfig, CoreModel};
use tessera_models::test_helpers::{build_system, SystemConfig};
use tessera_track::tracker::dev_null_tracker;

fn create_engine() -> Engine {
    // Create an engine without the tracker system opening files for logging
    let tracker = dev_null_tracker();
    Engine::new(&tracker)
}

fn run_engine(mut engine: Engine) {
    engine.run().unwrap();
}

fn spawn_system(num_tiles: usize, requests_per_core: usize) -> Engine {
    let mut engine = create_engine();
    let tiles = build_system(
        &mut engine,
        &SystemConfig {
            num_tiles,
            ..SystemConfig::default()
        },
    );
    let clock = engine.default_clock();

    for (i, tile) in tiles.iter().enumerate() {
        let cfg = CoreConfig {
            num_requests: requests_per_core,
            num_lines: 16,
            drain_ticks: 50,
            seed: i as u64,
            ..CoreConfig::default()
        };
        let top = engine.top().clone();
        CoreModel::new_and_register(
            &engine,
            &top,
            &format!("core{i}"),
            clock.clone(),
            tile.clone(),
            cfg,
        );
    }
    engine
}

fn spawn_two_tiles() -> Engine {
    spawn_system(2, 64)
}

fn spawn_eight_tiles() -> Engine {
    spawn_system(8, 32)
}

fn bench_models(c: &mut Criterion) {
    let mut group = c.benchmark_group("models");

    group.bench_function("two_tiles", |b| {
        b.iter_batched(spawn_two_tiles, run_engine, BatchSize::SmallInput);
    });

    group.bench_function("eight_tiles", |b| {
        b.iter_batched(spawn_eight_tiles, run_engine, BatchSize::SmallInput);
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = bench_models
}

criterion_main!(benches);
