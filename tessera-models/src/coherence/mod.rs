// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! The directory-based MSI coherence engine.
//!
//! One [`MsiEngine`] per tile owns the private L1, the local slice of the
//! shared L2 with its directory state, the address-to-home resolver and,
//! on one node, the DRAM controller. In-flight transactions live in three
//! work tables keyed by line start address with **at most one entry per
//! address per table**; that exclusivity is the serialization point the
//! whole protocol rests on.
//!
//! Each simulated cycle the engine is driven twice:
//!
//!   - [`tick_positive_edge`](MsiEngine::tick_positive_edge) runs
//!     [`schedule_requests`](MsiEngine::schedule_requests) (admission,
//!     arbitration, port dispatch, network egress) and ticks the
//!     sub-models;
//!   - [`tick_negative_edge`](MsiEngine::tick_negative_edge) commits the
//!     sub-models, accepts newly arrived messages with the two-phase
//!     handshake, and advances all three work tables.
//!
//! Backpressure anywhere (ports, table vacancies, queue capacity) is never
//! an error: core requests get `RETRY`, messages wait at their queue head,
//! entries simply re-offer next tick. Protocol inconsistencies are fatal.

pub mod annotations;
pub mod messages;
pub mod shuffle;

mod dram_table;
mod l1;
mod l2;

use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

use tessera_engine::sim_error;
use tessera_engine::types::SimError;
use tessera_track::debug;
use tessera_track::entity::Entity;

use crate::cache::{
    Cache, CacheConfig, CacheLine, CacheRequest, CacheRequestKind, CacheRequestStatus,
};
use crate::cat::{Cat, CatConfig, CatRequest, CatRequestStatus};
use crate::dram::{Dram, DramConfig};
use crate::memory_request::{MemoryRequest, MemoryRequestStatus};
use crate::{Maddr, flit_count, start_maddr, BYTES_PER_WORD};
use annotations::{CacheAnnotation, CacheSideGuard, DirAnnotation, DirSideGuard};
use messages::{CoherenceMsg, CoherenceMsgKind, DramMsg, MsgClass, NetMsg, NetPayload};
use shuffle::ShufflePolicy;

pub(crate) use dram_table::DramEntry;
pub(crate) use l1::L1Entry;
pub(crate) use l2::L2Entry;

/// Flat configuration for one tile's engine.
#[derive(Clone, Debug)]
pub struct CoherenceConfig {
    /// This tile's node id.
    pub id: u32,
    pub num_nodes: u32,
    /// The node owning the DRAM controller.
    pub dram_node: u32,
    pub words_per_line: usize,
    pub bytes_per_flit: usize,
    /// Address bytes charged per message on the wire.
    pub address_bytes: usize,
    pub num_core_ports: usize,
    pub l1_work_table_size: usize,
    pub l2_work_table_size: usize,
    /// Capacity of each per-class network queue.
    pub net_queue_capacity: usize,
    pub l1: CacheConfig,
    pub l2: CacheConfig,
    pub cat: CatConfig,
    pub dram: DramConfig,
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        Self {
            id: 0,
            num_nodes: 1,
            dram_node: 0,
            words_per_line: 8,
            bytes_per_flit: 8,
            address_bytes: 4,
            num_core_ports: 2,
            l1_work_table_size: 4,
            l2_work_table_size: 4,
            net_queue_capacity: 8,
            l1: CacheConfig {
                words_per_line: 8,
                num_lines: 64,
                associativity: 2,
                ..CacheConfig::default()
            },
            l2: CacheConfig {
                words_per_line: 8,
                num_lines: 256,
                associativity: 4,
                ..CacheConfig::default()
            },
            cat: CatConfig::default(),
            dram: DramConfig::default(),
        }
    }
}

impl CoherenceConfig {
    fn validate(&self, entity: &Arc<Entity>) -> Result<(), SimError> {
        if self.num_nodes == 0 {
            sim_error!(format!("{entity}: num_nodes must be non-zero"));
        }
        if self.id >= self.num_nodes {
            sim_error!(format!(
                "{entity}: id {} out of range for {} nodes",
                self.id, self.num_nodes
            ));
        }
        if self.dram_node >= self.num_nodes {
            sim_error!(format!(
                "{entity}: dram_node {} out of range for {} nodes",
                self.dram_node, self.num_nodes
            ));
        }
        if self.words_per_line == 0 {
            sim_error!(format!("{entity}: words_per_line must be non-zero"));
        }
        if self.bytes_per_flit == 0 {
            sim_error!(format!("{entity}: bytes_per_flit must be non-zero"));
        }
        if self.address_bytes == 0 {
            sim_error!(format!("{entity}: address_bytes must be non-zero"));
        }
        if self.num_core_ports == 0 {
            sim_error!(format!("{entity}: num_core_ports must be non-zero"));
        }
        if self.l1_work_table_size < self.num_core_ports {
            sim_error!(format!(
                "{entity}: l1_work_table_size {} smaller than num_core_ports {}",
                self.l1_work_table_size, self.num_core_ports
            ));
        }
        if self.l2_work_table_size == 0 {
            sim_error!(format!("{entity}: l2_work_table_size must be non-zero"));
        }
        if self.net_queue_capacity == 0 {
            sim_error!(format!("{entity}: net_queue_capacity must be non-zero"));
        }
        if self.l1.words_per_line != self.words_per_line
            || self.l2.words_per_line != self.words_per_line
        {
            sim_error!(format!(
                "{entity}: cache words_per_line must match the system line size"
            ));
        }
        Ok(())
    }
}

/// Per-tile engine counters, snapshotted by tests and the binary.
#[derive(Clone, Debug, Default)]
pub struct EngineMetrics {
    pub l1_hits: u64,
    pub l1_misses: u64,
    pub l2_hits: u64,
    pub l2_misses: u64,
    pub cat_lookups: u64,
    pub retries: u64,
    pub reads_served: u64,
    pub writes_served: u64,
    /// Sum over served core requests of admission-to-completion ticks.
    pub latency_sum: u64,
    pub msgs_sent: [u64; MsgClass::COUNT],
    pub msgs_received: [u64; MsgClass::COUNT],
    pub flits_sent: u64,
}

impl EngineMetrics {
    pub fn served(&self) -> u64 {
        self.reads_served + self.writes_served
    }
}

/// A contender for L1 work-table admission.
pub(crate) enum L1Seed {
    Core(Rc<MemoryRequest>),
    Msg(Rc<CoherenceMsg>),
}

/// One tile's coherence engine.
pub struct MsiEngine {
    pub(crate) entity: Arc<Entity>,
    pub(crate) cfg: CoherenceConfig,
    pub(crate) l1: Cache<CacheAnnotation>,
    pub(crate) l2: Cache<DirAnnotation>,
    pub(crate) cat: Cat,
    pub(crate) dram: Option<Dram>,
    pub(crate) shuffle: Box<dyn ShufflePolicy>,
    pub(crate) metrics: EngineMetrics,

    pub(crate) l1_table: HashMap<Maddr, L1Entry>,
    pub(crate) l2_table: HashMap<Maddr, L2Entry>,
    pub(crate) dram_table: HashMap<Maddr, DramEntry>,
    pub(crate) l1_vacancy: usize,
    pub(crate) l2_vacancy: usize,
    pub(crate) core_ports_free: usize,

    pub(crate) core_req_q: VecDeque<Rc<MemoryRequest>>,
    receive_qs: [VecDeque<NetMsg>; MsgClass::COUNT],
    send_qs: [VecDeque<NetMsg>; MsgClass::COUNT],
    next_send_class: usize,

    // Per-tick scheduler queues. Filled on the negative edge (and during
    // admission), consumed and cleared by the next schedule_requests pass;
    // anything unserved is re-offered by its owning entry.
    pub(crate) l1_seeds: Vec<L1Seed>,
    pub(crate) l2_rep_seeds: Vec<Rc<CoherenceMsg>>,
    pub(crate) l2_req_seeds: Vec<Rc<CoherenceMsg>>,
    pub(crate) dram_seeds: Vec<Rc<DramMsg>>,
    pub(crate) l1_read_q: Vec<Rc<CacheRequest<CacheAnnotation>>>,
    pub(crate) l1_write_q: Vec<Rc<CacheRequest<CacheAnnotation>>>,
    pub(crate) l2_read_q: Vec<Rc<CacheRequest<DirAnnotation>>>,
    pub(crate) l2_write_q: Vec<Rc<CacheRequest<DirAnnotation>>>,
    pub(crate) cat_q: Vec<Rc<CatRequest>>,
    pub(crate) net_out: Vec<(MsgClass, NetPayload)>,
    pub(crate) writeback_addrs: HashSet<Maddr>,
}

impl MsiEngine {
    pub fn new(
        parent: &Arc<Entity>,
        name: &str,
        cfg: CoherenceConfig,
        shuffle: Box<dyn ShufflePolicy>,
    ) -> Result<Self, SimError> {
        let entity = Arc::new(Entity::new(parent, name));
        cfg.validate(&entity)?;

        let l1 = Cache::new(&entity, "l1", cfg.l1.clone(), Box::new(CacheSideGuard))?;
        let l2 = Cache::new(&entity, "l2", cfg.l2.clone(), Box::new(DirSideGuard))?;
        let cat = Cat::new(
            &entity,
            "cat",
            cfg.cat.clone(),
            cfg.num_nodes,
            cfg.words_per_line,
        )?;
        let dram = if cfg.id == cfg.dram_node {
            Some(Dram::new(&entity, "dram", cfg.dram.clone(), cfg.words_per_line)?)
        } else {
            None
        };

        let l1_vacancy = cfg.l1_work_table_size;
        let l2_vacancy = cfg.l2_work_table_size;
        let core_ports_free = cfg.num_core_ports;
        Ok(Self {
            entity,
            cfg,
            l1,
            l2,
            cat,
            dram,
            shuffle,
            metrics: EngineMetrics::default(),
            l1_table: HashMap::new(),
            l2_table: HashMap::new(),
            dram_table: HashMap::new(),
            l1_vacancy,
            l2_vacancy,
            core_ports_free,
            core_req_q: VecDeque::new(),
            receive_qs: Default::default(),
            send_qs: Default::default(),
            next_send_class: 0,
            l1_seeds: Vec::new(),
            l2_rep_seeds: Vec::new(),
            l2_req_seeds: Vec::new(),
            dram_seeds: Vec::new(),
            l1_read_q: Vec::new(),
            l1_write_q: Vec::new(),
            l2_read_q: Vec::new(),
            l2_write_q: Vec::new(),
            cat_q: Vec::new(),
            net_out: Vec::new(),
            writeback_addrs: HashSet::new(),
        })
    }

    pub fn id(&self) -> u32 {
        self.cfg.id
    }

    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn dram(&self) -> Option<&Dram> {
        self.dram.as_ref()
    }

    /// Line start address for `maddr` under this engine's line size.
    pub fn line_of(&self, maddr: Maddr) -> Maddr {
        start_maddr(maddr, self.cfg.words_per_line)
    }

    /// Snapshot of the privately cached line holding `maddr`.
    pub fn l1_line(&self, maddr: Maddr) -> Option<CacheLine<CacheAnnotation>> {
        self.l1.peek_line(maddr)
    }

    /// Snapshot of the directory line holding `maddr`.
    pub fn directory_line(&self, maddr: Maddr) -> Option<CacheLine<DirAnnotation>> {
        self.l2.peek_line(maddr)
    }

    /// True when no transaction or message is in flight anywhere.
    pub fn quiescent(&self) -> bool {
        self.l1_table.is_empty()
            && self.l2_table.is_empty()
            && self.dram_table.is_empty()
            && self.core_req_q.is_empty()
            && self.receive_qs.iter().all(VecDeque::is_empty)
            && self.send_qs.iter().all(VecDeque::is_empty)
    }

    /// Accept a core request for arbitration. Always succeeds in queuing;
    /// the outcome is reported through the request's status.
    pub fn request(&mut self, req: Rc<MemoryRequest>) {
        assert_eq!(req.status(), MemoryRequestStatus::New);
        // Transactions are keyed by line; an access spilling into the next
        // line has no single home and is rejected up front.
        let offset = (req.maddr() - self.line_of(req.maddr())) as usize / BYTES_PER_WORD;
        assert!(
            req.word_count() >= 1 && offset + req.word_count() <= self.cfg.words_per_line,
            "{}: {req} crosses a line boundary",
            self.entity
        );
        req.set_status(MemoryRequestStatus::Wait);
        debug!(self.entity ; "core request {req}");
        self.core_req_q.push_back(req);
    }

    /// Offer an arriving network message to this tile's bounded ingress
    /// queue for its class. Returns false when the queue is full; the
    /// caller must hold the message and retry.
    pub fn deliver(&mut self, msg: NetMsg) -> bool {
        let qi = msg.class.index();
        if self.receive_qs[qi].len() >= self.cfg.net_queue_capacity {
            return false;
        }
        self.receive_qs[qi].push_back(msg);
        true
    }

    /// Take the next message queued for network transmission, round-robin
    /// across classes.
    pub fn take_outgoing(&mut self) -> Option<NetMsg> {
        for offset in 0..MsgClass::COUNT {
            let qi = (self.next_send_class + offset) % MsgClass::COUNT;
            if let Some(msg) = self.send_qs[qi].pop_front() {
                self.next_send_class = (qi + 1) % MsgClass::COUNT;
                return Some(msg);
            }
        }
        None
    }

    pub fn tick_positive_edge(&mut self, now: u64) {
        self.schedule_requests(now);
        self.l1.tick_positive_edge();
        self.l2.tick_positive_edge();
        self.cat.tick_positive_edge();
        if let Some(dram) = &mut self.dram {
            dram.tick_positive_edge();
        }
    }

    pub fn tick_negative_edge(&mut self, now: u64) {
        self.l1.tick_negative_edge();
        self.l2.tick_negative_edge();
        self.cat.tick_negative_edge();
        if let Some(dram) = &mut self.dram {
            dram.tick_negative_edge();
        }
        self.accept_incoming_messages();
        self.l1_work_table_update(now);
        self.l2_work_table_update(now);
        self.dram_work_table_update(now);
    }

    // ------------------------------------------------------------------
    // schedule_requests: positive-edge admission and arbitration
    // ------------------------------------------------------------------

    fn schedule_requests(&mut self, now: u64) {
        // 1. Core-port arbitration. Losers are told to retry.
        let contenders: Vec<_> = self.core_req_q.drain(..).collect();
        let mut ports = self.core_ports_free;
        for i in self.shuffle.permutation(contenders.len()) {
            let req = contenders[i].clone();
            if ports > 0 {
                ports -= 1;
                self.l1_seeds.push(L1Seed::Core(req));
            } else {
                req.set_status(MemoryRequestStatus::Retry);
                self.metrics.retries += 1;
            }
        }

        // 2. L1 work-table admission.
        let seeds = std::mem::take(&mut self.l1_seeds);
        for i in self.shuffle.permutation(seeds.len()) {
            match &seeds[i] {
                L1Seed::Core(req) => self.admit_l1_core(req.clone(), now),
                L1Seed::Msg(msg) => self.admit_l1_msg(msg.clone(), now),
            }
        }

        // 3. L2 work-table admission, replies before requests.
        let reps = std::mem::take(&mut self.l2_rep_seeds);
        for i in self.shuffle.permutation(reps.len()) {
            self.admit_l2_rep(reps[i].clone(), now);
        }
        let reqs = std::mem::take(&mut self.l2_req_seeds);
        for i in self.shuffle.permutation(reqs.len()) {
            self.admit_l2_req(reqs[i].clone(), now);
        }

        // 4. DRAM admission, writebacks ahead of feeds.
        let seeds = std::mem::take(&mut self.dram_seeds);
        let (writes, reads): (Vec<_>, Vec<_>) =
            seeds.into_iter().partition(|m| !m.req.is_read());
        for group in [writes, reads] {
            for i in self.shuffle.permutation(group.len()) {
                self.admit_dram(group[i].clone());
            }
        }

        // 5. Downstream dispatch onto cache and resolver ports.
        self.dispatch_cat();
        self.dispatch_l1_ports();
        self.dispatch_l2_ports();

        // 6. Network egress up to queue capacity.
        let outs = std::mem::take(&mut self.net_out);
        for i in self.shuffle.permutation(outs.len()) {
            let (class, payload) = &outs[i];
            self.egress(*class, payload);
        }

        self.writeback_addrs.clear();
    }

    fn admit_l1_core(&mut self, req: Rc<MemoryRequest>, now: u64) {
        let start = self.line_of(req.maddr());
        if self.l1_vacancy == 0 || self.l1_table.contains_key(&start) {
            req.set_status(MemoryRequestStatus::Retry);
            self.metrics.retries += 1;
            return;
        }
        let cache_req = Rc::new(l1::core_cache_request(&req));
        self.queue_l1_cache_req(&cache_req);
        self.l1_table.insert(start, L1Entry::for_core(req, cache_req, now));
        self.l1_vacancy -= 1;
        self.core_ports_free -= 1;
        debug!(self.entity ; "L1 entry opened for 0x{start:x}");
    }

    fn admit_l1_msg(&mut self, msg: Rc<CoherenceMsg>, now: u64) {
        let start = msg.maddr;
        if self.l1_vacancy == 0 || self.l1_table.contains_key(&start) {
            // Left unacknowledged; the sender or queue head re-offers.
            return;
        }
        let cache_req = Rc::new(match msg.kind {
            CoherenceMsgKind::InvReq | CoherenceMsgKind::FlushReq => {
                CacheRequest::new_invalidate(start)
            }
            CoherenceMsgKind::WbReq => CacheRequest::new_read(start, self.cfg.words_per_line),
            _ => panic!("{}: {} is not an L1-bound request", self.entity, msg),
        });
        self.queue_l1_cache_req(&cache_req);
        self.l1_table.insert(start, L1Entry::for_msg(msg.clone(), cache_req, now));
        self.l1_vacancy -= 1;
        msg.won_arbitration.set(true);
        debug!(self.entity ; "L1 entry opened for inbound {msg}");
    }

    fn admit_l2_rep(&mut self, msg: Rc<CoherenceMsg>, now: u64) {
        let start = msg.maddr;
        // A waiting entry may have appeared since the seed was queued.
        if let Some(entry) = self.l2_table.get_mut(&start) {
            if entry.awaits_replies() {
                entry.pending_reps.push(msg.clone());
                msg.won_arbitration.set(true);
            }
            return;
        }
        if self.l2_vacancy == 0 {
            return;
        }
        let cache_req = Rc::new(CacheRequest::new_read(start, self.cfg.words_per_line));
        self.l2_read_q.push(cache_req.clone());
        self.l2_table.insert(start, L2Entry::for_rep(msg.clone(), cache_req, now));
        self.l2_vacancy -= 1;
        msg.won_arbitration.set(true);
        debug!(self.entity ; "L2 entry opened for stray {msg}");
    }

    fn admit_l2_req(&mut self, msg: Rc<CoherenceMsg>, now: u64) {
        let start = msg.maddr;
        if self.l2_vacancy == 0 || self.l2_table.contains_key(&start) {
            return;
        }
        let cache_req =
            Rc::new(CacheRequest::new_read(start, self.cfg.words_per_line).allocating());
        self.l2_read_q.push(cache_req.clone());
        self.l2_table.insert(start, L2Entry::for_req(msg.clone(), cache_req, now));
        self.l2_vacancy -= 1;
        msg.won_arbitration.set(true);
        debug!(self.entity ; "L2 entry opened for {msg}");
    }

    fn admit_dram(&mut self, msg: Rc<DramMsg>) {
        if msg.sent.get() {
            return;
        }
        assert_eq!(
            msg.receiver, self.cfg.id,
            "{}: DRAM message routed to the wrong node",
            self.entity
        );
        let Some(dram) = self.dram.as_mut() else {
            panic!("{}: DRAM message at a node without a controller", self.entity);
        };
        let start = msg.req.maddr();
        if msg.req.is_read() {
            // Feeds yield to a writeback of the same line this tick.
            if self.writeback_addrs.contains(&start) {
                return;
            }
            if self.dram_table.contains_key(&start) || !dram.available() {
                return;
            }
            dram.request(msg.req.clone());
            self.dram_table.insert(start, DramEntry::new(msg.clone()));
        } else {
            if !dram.available() {
                return;
            }
            dram.request(msg.req.clone());
        }
        msg.sent.set(true);
        msg.won_arbitration.set(true);
    }

    pub(crate) fn queue_l1_cache_req(&mut self, req: &Rc<CacheRequest<CacheAnnotation>>) {
        if req.kind() == CacheRequestKind::Read {
            self.l1_read_q.push(req.clone());
        } else {
            self.l1_write_q.push(req.clone());
        }
    }

    pub(crate) fn queue_l2_cache_req(&mut self, req: &Rc<CacheRequest<DirAnnotation>>) {
        if req.kind() == CacheRequestKind::Read {
            self.l2_read_q.push(req.clone());
        } else {
            self.l2_write_q.push(req.clone());
        }
    }

    fn dispatch_cat(&mut self) {
        let queue = std::mem::take(&mut self.cat_q);
        for i in self.shuffle.permutation(queue.len()) {
            let req = &queue[i];
            if req.status() != CatRequestStatus::New {
                continue;
            }
            if !self.cat.available() {
                break;
            }
            self.cat.request(req.clone());
        }
    }

    fn dispatch_l1_ports(&mut self) {
        let reads = std::mem::take(&mut self.l1_read_q);
        for i in self.shuffle.permutation(reads.len()) {
            let req = &reads[i];
            if req.status() != CacheRequestStatus::New {
                continue;
            }
            if !self.l1.read_port_available() {
                break;
            }
            self.l1.request(req.clone());
        }
        let writes = std::mem::take(&mut self.l1_write_q);
        for i in self.shuffle.permutation(writes.len()) {
            let req = &writes[i];
            if req.status() != CacheRequestStatus::New {
                continue;
            }
            if !self.l1.write_port_available() {
                break;
            }
            self.l1.request(req.clone());
        }
    }

    fn dispatch_l2_ports(&mut self) {
        let reads = std::mem::take(&mut self.l2_read_q);
        for i in self.shuffle.permutation(reads.len()) {
            let req = &reads[i];
            if req.status() != CacheRequestStatus::New {
                continue;
            }
            if !self.l2.read_port_available() {
                break;
            }
            self.l2.request(req.clone());
        }
        // Writes serving a pending writeback win the ports first.
        let writes = std::mem::take(&mut self.l2_write_q);
        let (wb, rest): (Vec<_>, Vec<_>) = writes
            .into_iter()
            .partition(|r| self.writeback_addrs.contains(&self.line_of(r.maddr())));
        for group in [wb, rest] {
            for i in self.shuffle.permutation(group.len()) {
                let req = &group[i];
                if req.status() != CacheRequestStatus::New {
                    continue;
                }
                if !self.l2.write_port_available() {
                    break;
                }
                self.l2.request(req.clone());
            }
        }
    }

    fn egress(&mut self, class: MsgClass, payload: &NetPayload) {
        let qi = class.index();
        if self.send_qs[qi].len() >= self.cfg.net_queue_capacity {
            // Dropped for this tick; the owning entry re-offers.
            return;
        }
        let (src, dest) = match payload {
            NetPayload::Coherence(msg) => (msg.sender, msg.receiver),
            NetPayload::Dram(msg) => (msg.sender, msg.receiver),
        };
        assert_ne!(
            dest, self.cfg.id,
            "{}: local message reached network egress",
            self.entity
        );
        let bytes = self.payload_bytes(payload);
        let flits = flit_count(bytes, self.cfg.bytes_per_flit);
        let msg = NetMsg::new(&self.entity, src, dest, class, flits, bytes, payload.clone());
        debug!(self.entity ; "egress {msg}");
        payload.set_sent();
        self.metrics.msgs_sent[qi] += 1;
        self.metrics.flits_sent += flits as u64;
        self.send_qs[qi].push_back(msg);
    }

    /// Wire size: one kind byte, the address, and any payload words.
    fn payload_bytes(&self, payload: &NetPayload) -> usize {
        let data_bytes = match payload {
            NetPayload::Coherence(msg) => {
                msg.data.as_ref().map_or(0, |d| d.len() * BYTES_PER_WORD)
            }
            NetPayload::Dram(msg) => msg.req.data().len() * BYTES_PER_WORD,
        };
        1 + self.cfg.address_bytes + data_bytes
    }

    // ------------------------------------------------------------------
    // accept_incoming_messages: negative-edge two-phase handshake
    // ------------------------------------------------------------------

    fn accept_incoming_messages(&mut self) {
        for class in MsgClass::ALL {
            let qi = class.index();
            loop {
                let Some(head) = self.receive_qs[qi].front() else {
                    break;
                };
                let payload = head.payload.clone();
                match (class, payload) {
                    (MsgClass::Rep, NetPayload::Coherence(msg)) => {
                        if msg.won_arbitration.get() {
                            // Matched to a slot last tick; payload consumed.
                            msg.won_arbitration.set(false);
                            self.pop_received(qi);
                            continue;
                        }
                        match msg.kind {
                            CoherenceMsgKind::ShRep | CoherenceMsgKind::ExRep => {
                                self.deliver_rep_to_l1(&msg);
                                self.pop_received(qi);
                                continue;
                            }
                            CoherenceMsgKind::InvRep
                            | CoherenceMsgKind::WbRep
                            | CoherenceMsgKind::FlushRep => {
                                if let Some(entry) = self.l2_table.get_mut(&msg.maddr) {
                                    if entry.awaits_replies() {
                                        entry.pending_reps.push(msg.clone());
                                        self.pop_received(qi);
                                        continue;
                                    }
                                }
                                // A stray reply needs its own table slot.
                                self.l2_rep_seeds.push(msg.clone());
                                break;
                            }
                            _ => panic!("{}: {} in the reply queue", self.entity, msg),
                        }
                    }
                    (MsgClass::CacheReq, NetPayload::Coherence(msg)) => {
                        if msg.won_arbitration.get() {
                            msg.won_arbitration.set(false);
                            self.pop_received(qi);
                            continue;
                        }
                        self.l1_seeds.push(L1Seed::Msg(msg.clone()));
                        break;
                    }
                    (MsgClass::DirReq, NetPayload::Coherence(msg)) => {
                        if msg.won_arbitration.get() {
                            msg.won_arbitration.set(false);
                            self.pop_received(qi);
                            continue;
                        }
                        self.l2_req_seeds.push(msg.clone());
                        break;
                    }
                    (MsgClass::DramReq, NetPayload::Dram(msg)) => {
                        if msg.won_arbitration.get() {
                            msg.won_arbitration.set(false);
                            self.pop_received(qi);
                            continue;
                        }
                        self.dram_seeds.push(msg.clone());
                        break;
                    }
                    (MsgClass::DramRep, NetPayload::Dram(msg)) => {
                        self.deliver_dram_rep_to_l2(&msg);
                        self.pop_received(qi);
                        continue;
                    }
                    (class, _) => {
                        panic!("{}: mismatched payload in {:?} queue", self.entity, class);
                    }
                }
            }
        }
    }

    fn pop_received(&mut self, qi: usize) {
        self.receive_qs[qi].pop_front();
        self.metrics.msgs_received[qi] += 1;
    }

    /// Hand a directory reply to the L1 entry blocked on it.
    pub(crate) fn deliver_rep_to_l1(&mut self, msg: &Rc<CoherenceMsg>) {
        let Some(entry) = self.l1_table.get_mut(&msg.maddr) else {
            panic!(
                "{}: reply {} for 0x{:x} with no matching L1 entry",
                self.entity, msg, msg.maddr
            );
        };
        entry.accept_reply(&self.entity, msg.clone());
    }

    /// Hand a completed DRAM feed to the L2 entry blocked on it.
    pub(crate) fn deliver_dram_rep_to_l2(&mut self, msg: &Rc<DramMsg>) {
        let start = msg.req.maddr();
        let Some(entry) = self.l2_table.get_mut(&start) else {
            panic!(
                "{}: DRAM reply for 0x{:x} with no matching L2 entry",
                self.entity, start
            );
        };
        entry.accept_dram_rep(&self.entity, msg.clone());
    }
}

#[cfg(test)]
mod tests {
    use tessera_track::entity::toplevel;
    use tessera_track::tracker::dev_null_tracker;

    use super::shuffle::RotateShuffle;
    use super::*;

    fn test_cfg() -> CoherenceConfig {
        CoherenceConfig {
            num_nodes: 1,
            words_per_line: 4,
            l1: CacheConfig {
                words_per_line: 4,
                num_lines: 8,
                associativity: 2,
                ..CacheConfig::default()
            },
            l2: CacheConfig {
                words_per_line: 4,
                num_lines: 16,
                associativity: 2,
                ..CacheConfig::default()
            },
            dram: DramConfig {
                latency: 2,
                num_slots: 2,
            },
            ..CoherenceConfig::default()
        }
    }

    fn single_node(cfg: CoherenceConfig) -> MsiEngine {
        let tracker = dev_null_tracker();
        let top = toplevel(&tracker, "test");
        MsiEngine::new(&top, "engine", cfg, Box::new(RotateShuffle::new())).unwrap()
    }

    fn run_until_done(engine: &mut MsiEngine, req: &Rc<MemoryRequest>, limit: u64) {
        for now in 0..limit {
            engine.tick_positive_edge(now);
            engine.tick_negative_edge(now);
            match req.status() {
                MemoryRequestStatus::Done => return,
                MemoryRequestStatus::Retry => {
                    req.resubmit();
                    engine.request(req.clone());
                }
                _ => {}
            }
        }
        panic!("{req} not done after {limit} ticks");
    }

    #[test]
    fn read_miss_feeds_from_dram() {
        let mut engine = single_node(test_cfg());
        let req = Rc::new(MemoryRequest::new_read(0x40, 1));
        engine.request(req.clone());
        run_until_done(&mut engine, &req, 100);
        // Cold memory reads as zeros.
        assert_eq!(*req.data(), vec![0]);
        assert_eq!(engine.metrics().l1_misses, 1);
        assert_eq!(engine.metrics().l2_misses, 1);
        assert_eq!(engine.metrics().reads_served, 1);
        assert_eq!(engine.metrics().cat_lookups, 1);
        assert!(engine.quiescent());
    }

    #[test]
    fn write_then_read_back() {
        let mut engine = single_node(test_cfg());
        let write = Rc::new(MemoryRequest::new_write(0x44, vec![7]));
        engine.request(write.clone());
        run_until_done(&mut engine, &write, 100);

        let read = Rc::new(MemoryRequest::new_read(0x44, 1));
        engine.request(read.clone());
        run_until_done(&mut engine, &read, 100);
        assert_eq!(*read.data(), vec![7]);
        // The exclusive copy installed by the write serves the read.
        assert_eq!(engine.metrics().l1_hits, 1);
        assert_eq!(engine.metrics().writes_served, 1);
        assert_eq!(engine.metrics().reads_served, 1);
        assert!(engine.quiescent());
    }

    #[test]
    fn core_port_loser_is_told_to_retry() {
        let mut engine = single_node(CoherenceConfig {
            num_core_ports: 1,
            l1_work_table_size: 1,
            ..test_cfg()
        });
        let a = Rc::new(MemoryRequest::new_read(0x40, 1));
        let b = Rc::new(MemoryRequest::new_read(0x80, 1));
        engine.request(a.clone());
        engine.request(b.clone());
        engine.tick_positive_edge(0);
        engine.tick_negative_edge(0);
        assert_eq!(b.status(), MemoryRequestStatus::Retry);

        run_until_done(&mut engine, &a, 100);
        b.resubmit();
        engine.request(b.clone());
        run_until_done(&mut engine, &b, 100);
        assert!(engine.metrics().retries >= 1);
        assert!(engine.quiescent());
    }

    #[test]
    fn directory_eviction_reclaims_shared_victim() {
        // One directory line and one work table slot force the second read
        // to evict the first line while a sharer still holds it. The evicted
        // line's sharer set must be invalidated, not dropped, so the later
        // write to the victim address still finds a consistent directory.
        let mut engine = single_node(CoherenceConfig {
            l2_work_table_size: 1,
            l2: CacheConfig {
                words_per_line: 4,
                num_lines: 1,
                associativity: 1,
                ..CacheConfig::default()
            },
            ..test_cfg()
        });

        let first = Rc::new(MemoryRequest::new_read(0x00, 1));
        engine.request(first.clone());
        run_until_done(&mut engine, &first, 200);

        let evictor = Rc::new(MemoryRequest::new_read(0x40, 1));
        engine.request(evictor.clone());
        run_until_done(&mut engine, &evictor, 200);

        let write = Rc::new(MemoryRequest::new_write(0x00, vec![9]));
        engine.request(write.clone());
        run_until_done(&mut engine, &write, 200);

        let read = Rc::new(MemoryRequest::new_read(0x00, 1));
        engine.request(read.clone());
        run_until_done(&mut engine, &read, 200);
        assert_eq!(*read.data(), vec![9]);

        // Trailing invalidation rounds may outlive the last request.
        for now in 0..50 {
            engine.tick_positive_edge(now);
            engine.tick_negative_edge(now);
        }
        assert!(engine.quiescent());
    }

    #[test]
    #[should_panic(expected = "crosses a line boundary")]
    fn rejects_line_crossing_request() {
        let mut engine = single_node(test_cfg());
        // Four-word lines; a two-word read at the last word spills over.
        engine.request(Rc::new(MemoryRequest::new_read(0x4c, 2)));
    }

    #[test]
    fn rejects_inconsistent_config() {
        let tracker = dev_null_tracker();
        let top = toplevel(&tracker, "test");
        let cfg = CoherenceConfig {
            id: 3,
            num_nodes: 2,
            ..test_cfg()
        };
        assert!(MsiEngine::new(&top, "engine", cfg, Box::new(RotateShuffle::new())).is_err());
    }
}
