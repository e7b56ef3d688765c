// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! The Tessera simulator binary.
//!
//! Builds an N-tile system (tiles, interconnect, per-tile synthetic
//! cores) from the merged [configuration](config), runs it to
//! completion, and reports per-tile metrics.

mod config;

use std::io;
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;

use tessera_components::connect_port;
use tessera_engine::engine::Engine;
use tessera_engine::sim_error;
use tessera_engine::types::SimError;
use tessera_models::coherence::shuffle::RandomShuffle;
use tessera_models::coherence::CoherenceConfig;
use tessera_models::core_model::CoreModel;
use tessera_models::interconnect::Interconnect;
use tessera_models::tile::Tile;
use tessera_track::tracker::{EntityManager, TextTracker, Tracker};
use tessera_track::{TraceState, Writer};

use crate::config::SimConfig;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), SimError> {
    let cfg = SimConfig::load()?;
    let tracker = build_tracker(&cfg)?;
    let mut engine = Engine::new(&tracker);
    let (tiles, cores) = build_system(&mut engine, &cfg)?;

    engine.run()?;

    report(&tiles, &cores);
    for tile in &tiles {
        if !tile.quiescent() {
            sim_error!(format!("{} finished with transactions in flight", tile.entity));
        }
    }
    Ok(())
}

/// A stdout text tracker with the configured trace and log filtering.
fn build_tracker(cfg: &SimConfig) -> Result<Tracker, SimError> {
    let level = parse_level(&cfg.log_level)?;
    let trace = if cfg.trace {
        TraceState::Enabled
    } else {
        TraceState::Disabled
    };
    let mut manager = EntityManager::new(trace, level);
    for filter in &cfg.log_filters {
        let Some((regex, level)) = filter.split_once('=') else {
            return sim_error!(format!("log filter '{filter}' is not of the form 'regex=level'"));
        };
        manager.add_log_filter(regex, parse_level(level)?);
    }
    let writer: Writer = Box::new(io::BufWriter::new(io::stdout()));
    Ok(Arc::new(TextTracker::new(manager, writer)))
}

fn parse_level(name: &str) -> Result<log::Level, SimError> {
    name.parse()
        .map_err(|_| SimError(format!("unknown log level '{name}'")))
}

fn build_system(
    engine: &mut Engine,
    cfg: &SimConfig,
) -> Result<(Vec<Rc<Tile>>, Vec<Rc<CoreModel>>), SimError> {
    let spawner = engine.spawner.clone();
    let top = engine.top().clone();
    let clock = engine.default_clock();

    let interconnect = Interconnect::new_and_register(
        engine,
        &top,
        "net",
        clock.clone(),
        spawner.clone(),
        cfg.num_tiles,
        cfg.net_delay_ticks,
        cfg.net_buffer_capacity,
    );

    let template = cfg.engine_template();
    let mut tiles = Vec::with_capacity(cfg.num_tiles);
    let mut cores = Vec::with_capacity(cfg.num_tiles);
    for i in 0..cfg.num_tiles {
        let tile_cfg = CoherenceConfig {
            id: i as u32,
            num_nodes: cfg.num_tiles as u32,
            dram_node: 0,
            ..template.clone()
        };
        let shuffle = Box::new(RandomShuffle::new(cfg.seed.wrapping_add(i as u64)));
        let tile = Tile::new_and_register(
            engine,
            &top,
            &format!("tile{i}"),
            clock.clone(),
            spawner.clone(),
            tile_cfg,
            shuffle,
        )?;
        connect_port!(tile, tx => interconnect, rx, i);
        connect_port!(interconnect, tx, i => tile, rx);

        let core = CoreModel::new_and_register(
            engine,
            &top,
            &format!("core{i}"),
            clock.clone(),
            tile.clone(),
            cfg.core_config(i),
        );
        tiles.push(tile);
        cores.push(core);
    }
    Ok((tiles, cores))
}

fn report(tiles: &[Rc<Tile>], cores: &[Rc<CoreModel>]) {
    println!(
        "{:<8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>10} {:>10}",
        "tile", "reads", "writes", "retries", "l1_hits", "l1_miss", "l2_hits", "l2_miss", "flits", "avg_lat"
    );
    for (i, (tile, core)) in tiles.iter().zip(cores).enumerate() {
        let m = tile.metrics();
        let stats = core.stats();
        let avg_latency = if m.served() > 0 {
            m.latency_sum as f64 / m.served() as f64
        } else {
            0.0
        };
        println!(
            "{:<8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>10} {:>10.1}",
            format!("tile{i}"),
            m.reads_served,
            m.writes_served,
            stats.retries,
            m.l1_hits,
            m.l1_misses,
            m.l2_hits,
            m.l2_misses,
            m.flits_sent,
            avg_latency,
        );
    }
    let total_served: u64 = tiles.iter().map(|t| t.metrics().served()).sum();
    let total_msgs: u64 = tiles
        .iter()
        .map(|t| t.metrics().msgs_sent.iter().sum::<u64>())
        .sum();
    println!("total: {total_served} requests served, {total_msgs} messages exchanged");
}

#[cfg(test)]
mod tests {
    use tessera_track::tracker::dev_null_tracker;

    use super::*;

    #[test]
    fn small_system_runs_to_completion() {
        let cfg = SimConfig {
            num_tiles: 2,
            requests_per_core: 20,
            num_lines: 4,
            drain_ticks: 200,
            ..SimConfig::default()
        };
        let tracker = dev_null_tracker();
        let mut engine = Engine::new(&tracker);
        let (tiles, cores) = build_system(&mut engine, &cfg).unwrap();
        engine.run().unwrap();

        for core in &cores {
            assert_eq!(core.stats().completed, 20);
        }
        for tile in &tiles {
            assert!(tile.quiescent());
        }
    }
}
