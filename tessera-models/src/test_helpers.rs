// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Helpers shared by the system tests and benchmarks.

use std::rc::Rc;

use tessera_components::connect_port;
use tessera_engine::engine::Engine;

use crate::coherence::shuffle::RotateShuffle;
use crate::coherence::CoherenceConfig;
use crate::interconnect::Interconnect;
use crate::tile::Tile;

/// Knobs for [`build_system`].
pub struct SystemConfig {
    pub num_tiles: usize,
    pub net_delay_ticks: usize,
    pub net_buffer_capacity: usize,
    /// Template for every tile's engine; `id`, `num_nodes` and `dram_node`
    /// are filled in per tile.
    pub engine: CoherenceConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            num_tiles: 4,
            net_delay_ticks: 2,
            net_buffer_capacity: 16,
            engine: CoherenceConfig::default(),
        }
    }
}

/// Build tiles and the interconnect, fully wired, with deterministic
/// rotating arbitration so tests see a reproducible schedule.
pub fn build_system(engine: &mut Engine, cfg: &SystemConfig) -> Vec<Rc<Tile>> {
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

    let mut tiles = Vec::with_capacity(cfg.num_tiles);
    for i in 0..cfg.num_tiles {
        let tile_cfg = CoherenceConfig {
            id: i as u32,
            num_nodes: cfg.num_tiles as u32,
            dram_node: 0,
            ..cfg.engine.clone()
        };
        let tile = Tile::new_and_register(
            engine,
            &top,
            &format!("tile{i}"),
            clock.clone(),
            spawner.clone(),
            tile_cfg,
            Box::new(RotateShuffle::new()),
        )
        .unwrap();
        connect_port!(tile, tx => interconnect, rx, i);
        connect_port!(interconnect, tx, i => tile, rx);
        tiles.push(tile);
    }
    tiles
}
