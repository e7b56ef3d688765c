// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Address-to-home resolver.
//!
//! Maps a line address to the node owning its slice of the shared L2 and
//! directory. Lines are interleaved across nodes at line granularity, but
//! the lookup is still ported and latency-modelled so the engine pays a
//! cycle cost for it like the original hardware table would.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use tessera_engine::sim_error;
use tessera_engine::types::SimError;
use tessera_track::debug;
use tessera_track::entity::Entity;

use crate::{BYTES_PER_WORD, Maddr};

#[derive(Clone, Debug)]
pub struct CatConfig {
    /// Ticks from issue to resolution. Must be at least one.
    pub latency: u64,
    pub num_ports: usize,
}

impl Default for CatConfig {
    fn default() -> Self {
        Self {
            latency: 1,
            num_ports: 2,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CatRequestStatus {
    New,
    Wait,
    Done,
}

/// One home lookup, polled to `DONE`.
#[derive(Debug)]
pub struct CatRequest {
    maddr: Maddr,
    status: Cell<CatRequestStatus>,
    home: Cell<u32>,
}

impl CatRequest {
    #[must_use]
    pub fn new(maddr: Maddr) -> Self {
        Self {
            maddr,
            status: Cell::new(CatRequestStatus::New),
            home: Cell::new(0),
        }
    }

    pub fn maddr(&self) -> Maddr {
        self.maddr
    }

    pub fn status(&self) -> CatRequestStatus {
        self.status.get()
    }

    /// The resolved home node. Only valid once `DONE`.
    pub fn home(&self) -> u32 {
        assert_eq!(self.status.get(), CatRequestStatus::Done);
        self.home.get()
    }
}

struct Pending {
    req: Rc<CatRequest>,
    remaining: u64,
}

/// The resolver model.
pub struct Cat {
    entity: Arc<Entity>,
    cfg: CatConfig,
    num_nodes: u32,
    line_bytes: u64,
    pending: Vec<Pending>,
    ports_busy: usize,
    lookups: u64,
}

impl Cat {
    pub fn new(
        parent: &Arc<Entity>,
        name: &str,
        cfg: CatConfig,
        num_nodes: u32,
        words_per_line: usize,
    ) -> Result<Self, SimError> {
        let entity = Arc::new(Entity::new(parent, name));
        if cfg.latency == 0 {
            sim_error!(format!("{entity}: latency must be at least 1"));
        }
        if cfg.num_ports == 0 {
            sim_error!(format!("{entity}: num_ports must be non-zero"));
        }
        if num_nodes == 0 {
            sim_error!(format!("{entity}: num_nodes must be non-zero"));
        }
        if words_per_line == 0 {
            sim_error!(format!("{entity}: words_per_line must be non-zero"));
        }
        Ok(Self {
            entity,
            cfg,
            num_nodes,
            line_bytes: (words_per_line * BYTES_PER_WORD) as u64,
            pending: Vec::new(),
            ports_busy: 0,
            lookups: 0,
        })
    }

    pub fn available(&self) -> bool {
        self.ports_busy < self.cfg.num_ports
    }

    /// Total lookups resolved so far.
    pub fn num_lookups(&self) -> u64 {
        self.lookups
    }

    pub fn request(&mut self, req: Rc<CatRequest>) {
        assert!(
            self.available(),
            "{}: no port for 0x{:x}",
            self.entity,
            req.maddr
        );
        self.ports_busy += 1;
        req.status.set(CatRequestStatus::Wait);
        self.pending.push(Pending {
            req,
            remaining: self.cfg.latency,
        });
    }

    pub fn tick_positive_edge(&mut self) {
        for p in &mut self.pending {
            if p.remaining > 0 {
                p.remaining -= 1;
            }
        }
    }

    pub fn tick_negative_edge(&mut self) {
        let mut still_pending = Vec::new();
        for p in std::mem::take(&mut self.pending) {
            if p.remaining == 0 {
                self.ports_busy -= 1;
                self.lookups += 1;
                let home = ((p.req.maddr / self.line_bytes) % self.num_nodes as u64) as u32;
                p.req.home.set(home);
                p.req.status.set(CatRequestStatus::Done);
                debug!(self.entity ; "0x{:x} homed at {}", p.req.maddr, home);
            } else {
                still_pending.push(p);
            }
        }
        self.pending = still_pending;
    }
}

#[cfg(test)]
mod tests {
    use tessera_track::entity::toplevel;
    use tessera_track::tracker::dev_null_tracker;

    use super::*;

    fn test_cat(num_nodes: u32) -> Cat {
        let tracker = dev_null_tracker();
        let top = toplevel(&tracker, "test");
        Cat::new(&top, "cat", CatConfig::default(), num_nodes, 8).unwrap()
    }

    #[test]
    fn line_interleaved_homes() {
        let mut cat = test_cat(4);
        // 8 words of 4 bytes: consecutive 32-byte lines stripe across nodes.
        let reqs: Vec<Rc<CatRequest>> = [0x00u64, 0x20, 0x47, 0x60, 0x80]
            .iter()
            .map(|&maddr| Rc::new(CatRequest::new(maddr)))
            .collect();
        // Two ports: feed in pairs.
        for chunk in reqs.chunks(2) {
            for req in chunk {
                cat.request(req.clone());
            }
            cat.tick_positive_edge();
            cat.tick_negative_edge();
        }
        let homes: Vec<u32> = reqs.iter().map(|r| r.home()).collect();
        assert_eq!(homes, vec![0, 1, 2, 3, 0]);
    }

    #[test]
    fn ports_limit_issue() {
        let mut cat = test_cat(2);
        assert!(cat.available());
        cat.request(Rc::new(CatRequest::new(0x0)));
        cat.request(Rc::new(CatRequest::new(0x20)));
        assert!(!cat.available());
        cat.tick_positive_edge();
        cat.tick_negative_edge();
        assert!(cat.available());
        assert_eq!(cat.num_lookups(), 2);
    }

    #[test]
    fn rejects_zero_nodes() {
        let tracker = dev_null_tracker();
        let top = toplevel(&tracker, "test");
        assert!(Cat::new(&top, "cat", CatConfig::default(), 0, 8).is_err());
    }
}
