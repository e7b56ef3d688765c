// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! A set-associative cache with ported, latency-modelled access.
//!
//! The cache stores [lines](CacheLine) carrying a raw word payload plus an
//! opaque coherence annotation `A`. What counts as a hit for a given
//! request, and which lines may be chosen as eviction victims, is decided
//! by a [`LineGuard`] installed at construction; the coherence engine
//! installs one guard implementation for its private (cache-side) L1 and a
//! different one for its directory (L2) slice.
//!
//! Accesses are polled, not awaited: the owner issues a
//! [`CacheRequest`] through [`request`](Cache::request) while a matching
//! port is [available](Cache::read_port_available), then observes the
//! request status flip to `HIT`/`MISS` after the configured hit-test
//! latency. A request issued on the positive edge of tick `N` completes on
//! the negative edge of tick `N + latency - 1`.

use std::cell::{Cell, Ref, RefCell};
use std::fmt::Debug;
use std::rc::Rc;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tessera_engine::sim_error;
use tessera_engine::types::SimError;
use tessera_track::debug;
use tessera_track::entity::Entity;

use crate::{BYTES_PER_WORD, Maddr, start_maddr};

/// Victim selection policy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReplacementPolicy {
    Lru,
    Random,
}

/// Construction-time cache geometry.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub words_per_line: usize,
    pub num_lines: usize,
    pub associativity: usize,
    /// Ticks from issue to hit/miss resolution. Must be at least one.
    pub hit_test_latency: u64,
    pub num_read_ports: usize,
    pub num_write_ports: usize,
    pub replacement: ReplacementPolicy,
    /// Seed for the random replacement policy.
    pub seed: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            words_per_line: 8,
            num_lines: 256,
            associativity: 4,
            hit_test_latency: 1,
            num_read_ports: 2,
            num_write_ports: 2,
            replacement: ReplacementPolicy::Lru,
            seed: 1,
        }
    }
}

/// One resident cache line.
#[derive(Clone, Debug)]
pub struct CacheLine<A: Clone> {
    /// Line-aligned start address.
    pub start_maddr: Maddr,
    /// False while the line is reserved and its fill is still in flight.
    pub ready: bool,
    pub dirty: bool,
    pub data: Vec<u32>,
    pub annotation: A,
    last_use: u64,
}

/// Decides hits and eviction eligibility for one coherence variant.
pub trait LineGuard<A: Clone> {
    /// Whether `line` satisfies `req` in its current coherence state.
    /// Only consulted for `READ`/`WRITE` requests on a present line.
    fn is_hit(&self, req: &CacheRequest<A>, line: &CacheLine<A>) -> bool;

    /// Whether `line` may be chosen as an eviction victim.
    fn can_evict(&self, line: &CacheLine<A>) -> bool;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CacheRequestKind {
    Read,
    Write,
    /// Replace payload/annotation/dirty state of a present line in place.
    Update,
    /// Remove a line, returning its final contents via `line_copy`.
    Invalidate,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CacheRequestStatus {
    New,
    Wait,
    Hit,
    Miss,
}

/// A single ported cache access.
///
/// Shared as `Rc<CacheRequest<A>>` between the issuing work-table entry and
/// the cache. On completion [`line_copy`](CacheRequest::line_copy) holds a
/// snapshot of the line involved (the hit line, the line that caused a
/// coherence miss, or a freshly reserved line with `ready == false`), and
/// [`victim_copy`](CacheRequest::victim_copy) holds any line evicted to make
/// room.
pub struct CacheRequest<A: Clone> {
    kind: CacheRequestKind,
    maddr: Maddr,
    word_count: usize,
    /// On miss, reserve a line for the address if a way is free.
    reserve: bool,
    /// On miss with no free way, evict a victim to free one.
    evict: bool,
    data: RefCell<Option<Vec<u32>>>,
    annotation: RefCell<Option<A>>,
    dirty: Cell<Option<bool>>,
    status: Cell<CacheRequestStatus>,
    line_copy: RefCell<Option<CacheLine<A>>>,
    victim_copy: RefCell<Option<CacheLine<A>>>,
}

impl<A: Clone> CacheRequest<A> {
    #[must_use]
    pub fn new_read(maddr: Maddr, word_count: usize) -> Self {
        Self::new(CacheRequestKind::Read, maddr, word_count)
    }

    #[must_use]
    pub fn new_write(maddr: Maddr, data: Vec<u32>) -> Self {
        let req = Self::new(CacheRequestKind::Write, maddr, data.len());
        *req.data.borrow_mut() = Some(data);
        req
    }

    /// An in-place line update: each of `data`, `annotation` and `dirty`
    /// replaces the line's current value when given. The line becomes ready.
    #[must_use]
    pub fn new_update(
        maddr: Maddr,
        data: Option<Vec<u32>>,
        annotation: Option<A>,
        dirty: Option<bool>,
    ) -> Self {
        let req = Self::new(CacheRequestKind::Update, maddr, 0);
        *req.data.borrow_mut() = data;
        *req.annotation.borrow_mut() = annotation;
        req.dirty.set(dirty);
        req
    }

    #[must_use]
    pub fn new_invalidate(maddr: Maddr) -> Self {
        Self::new(CacheRequestKind::Invalidate, maddr, 0)
    }

    fn new(kind: CacheRequestKind, maddr: Maddr, word_count: usize) -> Self {
        Self {
            kind,
            maddr,
            word_count,
            reserve: false,
            evict: false,
            data: RefCell::new(None),
            annotation: RefCell::new(None),
            dirty: Cell::new(None),
            status: Cell::new(CacheRequestStatus::New),
            line_copy: RefCell::new(None),
            victim_copy: RefCell::new(None),
        }
    }

    /// Allow this request to reserve a line on miss, evicting if needed.
    #[must_use]
    pub fn allocating(mut self) -> Self {
        self.reserve = true;
        self.evict = true;
        self
    }

    pub fn kind(&self) -> CacheRequestKind {
        self.kind
    }

    pub fn maddr(&self) -> Maddr {
        self.maddr
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn status(&self) -> CacheRequestStatus {
        self.status.get()
    }

    pub fn set_status(&self, status: CacheRequestStatus) {
        self.status.set(status);
    }

    pub fn line_copy(&self) -> Ref<'_, Option<CacheLine<A>>> {
        self.line_copy.borrow()
    }

    pub fn victim_copy(&self) -> Ref<'_, Option<CacheLine<A>>> {
        self.victim_copy.borrow()
    }

    /// Take the evicted victim out of the request.
    pub fn take_victim(&self) -> Option<CacheLine<A>> {
        self.victim_copy.borrow_mut().take()
    }

    fn needs_write_port(&self) -> bool {
        self.kind != CacheRequestKind::Read
    }
}

/// Per-cache access counters.
#[derive(Clone, Debug, Default)]
pub struct CacheMetrics {
    pub reads: u64,
    pub writes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Pending<A: Clone> {
    req: Rc<CacheRequest<A>>,
    remaining: u64,
}

/// The cache model. Polled by its owning engine on both clock edges.
pub struct Cache<A: Clone + Debug + Default> {
    entity: Arc<Entity>,
    cfg: CacheConfig,
    num_sets: usize,
    sets: Vec<Vec<Option<CacheLine<A>>>>,
    guard: Box<dyn LineGuard<A>>,
    pending: Vec<Pending<A>>,
    read_ports_busy: usize,
    write_ports_busy: usize,
    rng: StdRng,
    use_counter: u64,
    metrics: CacheMetrics,
}

impl<A: Clone + Debug + Default> Cache<A> {
    pub fn new(
        parent: &Arc<Entity>,
        name: &str,
        cfg: CacheConfig,
        guard: Box<dyn LineGuard<A>>,
    ) -> Result<Self, SimError> {
        let entity = Arc::new(Entity::new(parent, name));
        if cfg.words_per_line == 0 {
            sim_error!(format!("{entity}: words_per_line must be non-zero"));
        }
        if cfg.num_lines == 0 || cfg.associativity == 0 {
            sim_error!(format!("{entity}: cache geometry must be non-zero"));
        }
        if cfg.num_lines % cfg.associativity != 0 {
            sim_error!(format!(
                "{entity}: num_lines {} not divisible by associativity {}",
                cfg.num_lines, cfg.associativity
            ));
        }
        if cfg.hit_test_latency == 0 {
            sim_error!(format!("{entity}: hit_test_latency must be at least 1"));
        }
        if cfg.num_read_ports == 0 || cfg.num_write_ports == 0 {
            sim_error!(format!("{entity}: port counts must be non-zero"));
        }

        let num_sets = cfg.num_lines / cfg.associativity;
        let sets = (0..num_sets)
            .map(|_| (0..cfg.associativity).map(|_| None).collect())
            .collect();
        let rng = StdRng::seed_from_u64(cfg.seed);
        Ok(Self {
            entity,
            cfg,
            num_sets,
            sets,
            guard,
            pending: Vec::new(),
            read_ports_busy: 0,
            write_ports_busy: 0,
            rng,
            use_counter: 0,
            metrics: CacheMetrics::default(),
        })
    }

    pub fn read_port_available(&self) -> bool {
        self.read_ports_busy < self.cfg.num_read_ports
    }

    pub fn write_port_available(&self) -> bool {
        self.write_ports_busy < self.cfg.num_write_ports
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Port-free snapshot of the line holding `maddr`, if present.
    pub fn peek_line(&self, maddr: Maddr) -> Option<CacheLine<A>> {
        let start = start_maddr(maddr, self.cfg.words_per_line);
        self.sets[self.set_index(start)]
            .iter()
            .flatten()
            .find(|line| line.start_maddr == start)
            .cloned()
    }

    /// Accept a request onto a free port. The caller must have checked port
    /// availability this tick.
    pub fn request(&mut self, req: Rc<CacheRequest<A>>) {
        if req.needs_write_port() {
            assert!(
                self.write_port_available(),
                "{}: no write port for 0x{:x}",
                self.entity,
                req.maddr
            );
            self.write_ports_busy += 1;
            self.metrics.writes += 1;
        } else {
            assert!(
                self.read_port_available(),
                "{}: no read port for 0x{:x}",
                self.entity,
                req.maddr
            );
            self.read_ports_busy += 1;
            self.metrics.reads += 1;
        }
        req.set_status(CacheRequestStatus::Wait);
        self.pending.push(Pending {
            req,
            remaining: self.cfg.hit_test_latency,
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
                if p.req.needs_write_port() {
                    self.write_ports_busy -= 1;
                } else {
                    self.read_ports_busy -= 1;
                }
                self.perform(&p.req);
            } else {
                still_pending.push(p);
            }
        }
        self.pending = still_pending;
    }

    fn line_bytes(&self) -> u64 {
        (self.cfg.words_per_line * BYTES_PER_WORD) as u64
    }

    fn set_index(&self, start: Maddr) -> usize {
        ((start / self.line_bytes()) % self.num_sets as u64) as usize
    }

    fn perform(&mut self, req: &Rc<CacheRequest<A>>) {
        let start = start_maddr(req.maddr, self.cfg.words_per_line);
        let set_idx = self.set_index(start);
        self.use_counter += 1;
        let use_counter = self.use_counter;

        let way = self.sets[set_idx]
            .iter()
            .position(|l| l.as_ref().is_some_and(|l| l.start_maddr == start));

        match req.kind {
            CacheRequestKind::Invalidate => match way {
                Some(w) => {
                    let line = self.sets[set_idx][w].take();
                    *req.line_copy.borrow_mut() = line;
                    req.set_status(CacheRequestStatus::Hit);
                }
                None => req.set_status(CacheRequestStatus::Miss),
            },
            CacheRequestKind::Update => match way {
                Some(w) => {
                    let line = self.sets[set_idx][w].as_mut().unwrap();
                    if let Some(data) = req.data.borrow_mut().take() {
                        assert_eq!(data.len(), self.cfg.words_per_line);
                        line.data = data;
                    }
                    if let Some(annotation) = req.annotation.borrow_mut().take() {
                        line.annotation = annotation;
                    }
                    if let Some(dirty) = req.dirty.get() {
                        line.dirty = dirty;
                    }
                    line.ready = true;
                    line.last_use = use_counter;
                    *req.line_copy.borrow_mut() = Some(line.clone());
                    req.set_status(CacheRequestStatus::Hit);
                }
                None => {
                    panic!("{}: update for 0x{:x} with no line present", self.entity, start);
                }
            },
            CacheRequestKind::Read | CacheRequestKind::Write => match way {
                Some(w) => {
                    let is_hit = {
                        let line = self.sets[set_idx][w].as_ref().unwrap();
                        self.guard.is_hit(req, line)
                    };
                    let line = self.sets[set_idx][w].as_mut().unwrap();
                    if is_hit {
                        if req.kind == CacheRequestKind::Write {
                            let offset = ((req.maddr - start) / BYTES_PER_WORD as u64) as usize;
                            let data = req.data.borrow();
                            let words = data.as_ref().unwrap();
                            line.data[offset..offset + words.len()].copy_from_slice(words);
                            line.dirty = true;
                        }
                        line.last_use = use_counter;
                        *req.line_copy.borrow_mut() = Some(line.clone());
                        req.set_status(CacheRequestStatus::Hit);
                        self.metrics.hits += 1;
                        debug!(self.entity ; "hit 0x{:x}", req.maddr);
                    } else {
                        // Present in an insufficient coherence state: report
                        // the line so the caller can see why it missed.
                        *req.line_copy.borrow_mut() = Some(line.clone());
                        req.set_status(CacheRequestStatus::Miss);
                        self.metrics.misses += 1;
                        debug!(self.entity ; "coherence miss 0x{:x}", req.maddr);
                    }
                }
                None => {
                    self.metrics.misses += 1;
                    if req.reserve {
                        self.reserve(set_idx, start, req);
                    }
                    req.set_status(CacheRequestStatus::Miss);
                    debug!(self.entity ; "miss 0x{:x}", req.maddr);
                }
            },
        }
    }

    /// Reserve a line for `start`, evicting a victim when allowed and
    /// needed. On success the reserved line (not ready) lands in
    /// `line_copy`; if nothing can be freed neither copy is set and the
    /// caller must retry later.
    fn reserve(&mut self, set_idx: usize, start: Maddr, req: &Rc<CacheRequest<A>>) {
        let use_counter = self.use_counter;
        let free = self.sets[set_idx].iter().position(|l| l.is_none());
        let way = match free {
            Some(w) => Some(w),
            None if req.evict => {
                let victim_way = self.pick_victim(set_idx);
                if let Some(w) = victim_way {
                    let victim = self.sets[set_idx][w].take();
                    self.metrics.evictions += 1;
                    debug!(self.entity ;
                        "evict 0x{:x} for 0x{:x}",
                        victim.as_ref().unwrap().start_maddr, start);
                    *req.victim_copy.borrow_mut() = victim;
                }
                victim_way
            }
            None => None,
        };

        if let Some(w) = way {
            let line = CacheLine {
                start_maddr: start,
                ready: false,
                dirty: false,
                data: vec![0; self.cfg.words_per_line],
                annotation: A::default(),
                last_use: use_counter,
            };
            *req.line_copy.borrow_mut() = Some(line.clone());
            self.sets[set_idx][w] = Some(line);
        }
    }

    fn pick_victim(&mut self, set_idx: usize) -> Option<usize> {
        let candidates: Vec<usize> = self.sets[set_idx]
            .iter()
            .enumerate()
            .filter(|(_, l)| {
                l.as_ref()
                    .is_some_and(|l| l.ready && self.guard.can_evict(l))
            })
            .map(|(w, _)| w)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        match self.cfg.replacement {
            ReplacementPolicy::Lru => candidates
                .iter()
                .copied()
                .min_by_key(|&w| self.sets[set_idx][w].as_ref().unwrap().last_use),
            ReplacementPolicy::Random => {
                Some(candidates[self.rng.gen_range(0..candidates.len())])
            }
        }
    }
}
