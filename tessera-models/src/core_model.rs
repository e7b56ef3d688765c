// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! A synthetic core issuing memory traffic into its tile.
//!
//! Each core keeps up to `max_outstanding` requests in flight over a
//! window of lines, resubmits anything the engine bounces with `RETRY`,
//! and finishes once its quota has completed. Cores are the only tasks
//! that hold the simulation open; tiles and the interconnect exit with
//! them.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tessera_engine::engine::Engine;
use tessera_engine::time::clock::Clock;
use tessera_engine::traits::Runnable;
use tessera_engine::types::SimResult;
use tessera_model_builder::EntityDisplay;
use tessera_track::debug;
use tessera_track::entity::Entity;

use crate::memory_request::{MemoryRequest, MemoryRequestStatus};
use crate::tile::Tile;
use crate::{Maddr, BYTES_PER_WORD};

#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// Requests to issue before finishing.
    pub num_requests: usize,
    pub max_outstanding: usize,
    /// First line of the window this core touches.
    pub base: Maddr,
    /// Window size in lines.
    pub num_lines: usize,
    pub words_per_line: usize,
    /// Percentage of requests that are writes.
    pub write_percent: u8,
    /// Ticks to keep the simulation open after the quota completes, so
    /// in-flight protocol traffic can settle.
    pub drain_ticks: u64,
    pub seed: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            num_requests: 64,
            max_outstanding: 2,
            base: 0,
            num_lines: 16,
            words_per_line: 8,
            write_percent: 30,
            drain_ticks: 100,
            seed: 1,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CoreStats {
    pub issued: u64,
    pub completed: u64,
    pub retries: u64,
}

#[derive(Clone, EntityDisplay)]
pub struct CoreModel {
    pub entity: Arc<Entity>,
    clock: Clock,
    tile: Rc<Tile>,
    cfg: CoreConfig,
    stats: Rc<RefCell<CoreStats>>,
}

impl CoreModel {
    pub fn new(
        parent: &Arc<Entity>,
        name: &str,
        clock: Clock,
        tile: Rc<Tile>,
        cfg: CoreConfig,
    ) -> Self {
        assert!(cfg.num_lines > 0, "core window must cover at least one line");
        assert!(cfg.max_outstanding > 0);
        Self {
            entity: Arc::new(Entity::new(parent, name)),
            clock,
            tile,
            cfg,
            stats: Rc::new(RefCell::new(CoreStats::default())),
        }
    }

    #[must_use]
    pub fn new_and_register(
        engine: &Engine,
        parent: &Arc<Entity>,
        name: &str,
        clock: Clock,
        tile: Rc<Tile>,
        cfg: CoreConfig,
    ) -> Rc<Self> {
        let rc_self = Rc::new(Self::new(parent, name, clock, tile, cfg));
        engine.register(rc_self.clone());
        rc_self
    }

    pub fn stats(&self) -> CoreStats {
        self.stats.borrow().clone()
    }

    fn next_request(&self, rng: &mut StdRng, serial: u64) -> Rc<MemoryRequest> {
        let line_bytes = (self.cfg.words_per_line * BYTES_PER_WORD) as Maddr;
        let line = rng.gen_range(0..self.cfg.num_lines) as Maddr;
        let word = rng.gen_range(0..self.cfg.words_per_line) as Maddr;
        let maddr = self.cfg.base + line * line_bytes + word * BYTES_PER_WORD as Maddr;
        if rng.gen_range(0..100) < self.cfg.write_percent {
            Rc::new(MemoryRequest::new_write(maddr, vec![serial as u32]))
        } else {
            Rc::new(MemoryRequest::new_read(maddr, 1))
        }
    }

    pub async fn run(&self) -> SimResult {
        let mut rng = StdRng::seed_from_u64(self.cfg.seed);
        let mut outstanding: Vec<Rc<MemoryRequest>> = Vec::new();
        let mut issued = 0usize;
        loop {
            {
                let mut stats = self.stats.borrow_mut();
                outstanding.retain(|req| match req.status() {
                    MemoryRequestStatus::Done => {
                        stats.completed += 1;
                        false
                    }
                    MemoryRequestStatus::Retry => {
                        stats.retries += 1;
                        req.resubmit();
                        self.tile.request(req.clone());
                        true
                    }
                    _ => true,
                });
            }

            while outstanding.len() < self.cfg.max_outstanding && issued < self.cfg.num_requests {
                let req = self.next_request(&mut rng, issued as u64);
                debug!(self.entity ; "issue {req}");
                self.tile.request(req.clone());
                outstanding.push(req);
                issued += 1;
                self.stats.borrow_mut().issued += 1;
            }

            if issued == self.cfg.num_requests && outstanding.is_empty() {
                debug!(self.entity ; "finished {} requests", issued);
                self.clock.wait_ticks(self.cfg.drain_ticks).await;
                return Ok(());
            }
            self.clock.wait_ticks(1).await;
        }
    }
}

#[async_trait(?Send)]
impl Runnable for CoreModel {
    async fn run(&self) -> SimResult {
        CoreModel::run(self).await
    }
}
