// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! L1-side transactions: core requests and directory-originated orders.
//!
//! Each [`L1Entry`] walks a small state machine once per negative edge.
//! A step that cannot make progress (a cache request still in flight, an
//! outgoing message not yet accepted) leaves the entry unchanged and
//! re-offers its work next tick; nothing here blocks.

use std::rc::Rc;
use std::sync::Arc;

use tessera_engine::types::ReqType;
use tessera_track::debug;
use tessera_track::entity::Entity;

use super::annotations::{CacheAnnotation, CacheStatus};
use super::messages::{CoherenceMsg, CoherenceMsgKind, MsgClass, NetPayload};
use super::MsiEngine;
use crate::cache::{CacheRequest, CacheRequestStatus};
use crate::cat::{CatRequest, CatRequestStatus};
use crate::memory_request::{MemoryRequest, MemoryRequestStatus};
use crate::{Maddr, BYTES_PER_WORD};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum L1State {
    /// Look the line up in the L1.
    ReadL1,
    /// Resolve the directory home for a missing line.
    ReadCat,
    /// Offer SH_REQ/EX_REQ to the home directory.
    SendReq,
    /// Block until the directory's reply is delivered.
    WaitRep,
    /// Install the granted line and serve the core request from it.
    FeedL1,
    /// Downgrade a written-back line in place.
    UpdateL1,
    /// Offer an outgoing reply, then erase or restart.
    SendRep,
    /// Drop a SHARED copy before requesting it exclusively.
    InvalidateAndRestart,
}

/// What to do once the entry's outgoing reply has been accepted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum AfterRep {
    Erase,
    Restart,
}

/// One in-flight L1 transaction, keyed by line start address.
pub(crate) struct L1Entry {
    pub(crate) state: L1State,
    pub(crate) core_req: Option<Rc<MemoryRequest>>,
    /// The directory order being serviced, for message-seeded entries.
    pub(crate) inbound: Option<Rc<CoherenceMsg>>,
    pub(crate) cache_req: Option<Rc<CacheRequest<CacheAnnotation>>>,
    pub(crate) cat_req: Option<Rc<CatRequest>>,
    pub(crate) out_req: Option<Rc<CoherenceMsg>>,
    /// The SH_REP/EX_REP delivered by the receive handshake.
    pub(crate) reply: Option<Rc<CoherenceMsg>>,
    pub(crate) out_rep: Option<Rc<CoherenceMsg>>,
    pub(crate) after_rep: AfterRep,
    /// Home of the SHARED copy dropped on the upgrade path.
    pub(crate) prev_home: u32,
    /// Pre-downgrade line payload, returned in the WB_REP.
    pub(crate) flush_data: Option<Vec<u32>>,
    pub(crate) requested_at: u64,
}

impl L1Entry {
    pub(crate) fn for_core(
        req: Rc<MemoryRequest>,
        cache_req: Rc<CacheRequest<CacheAnnotation>>,
        now: u64,
    ) -> Self {
        Self {
            state: L1State::ReadL1,
            core_req: Some(req),
            inbound: None,
            cache_req: Some(cache_req),
            cat_req: None,
            out_req: None,
            reply: None,
            out_rep: None,
            after_rep: AfterRep::Erase,
            prev_home: 0,
            flush_data: None,
            requested_at: now,
        }
    }

    pub(crate) fn for_msg(
        msg: Rc<CoherenceMsg>,
        cache_req: Rc<CacheRequest<CacheAnnotation>>,
        now: u64,
    ) -> Self {
        Self {
            state: L1State::ReadL1,
            core_req: None,
            inbound: Some(msg),
            cache_req: Some(cache_req),
            cat_req: None,
            out_req: None,
            reply: None,
            out_rep: None,
            after_rep: AfterRep::Erase,
            prev_home: 0,
            flush_data: None,
            requested_at: now,
        }
    }

    pub(crate) fn accept_reply(&mut self, entity: &Arc<Entity>, msg: Rc<CoherenceMsg>) {
        assert_eq!(
            self.state,
            L1State::WaitRep,
            "{entity}: {msg} delivered to an L1 entry that is not waiting"
        );
        assert!(
            self.reply.is_none(),
            "{entity}: duplicate reply {msg} for a waiting L1 entry"
        );
        self.reply = Some(msg);
    }
}

/// The cache lookup opening a core-seeded transaction.
pub(crate) fn core_cache_request(req: &Rc<MemoryRequest>) -> CacheRequest<CacheAnnotation> {
    match req.req_type() {
        ReqType::Read => CacheRequest::new_read(req.maddr(), req.word_count()).allocating(),
        _ => CacheRequest::new_write(req.maddr(), req.data().clone()).allocating(),
    }
}

impl MsiEngine {
    pub(crate) fn l1_work_table_update(&mut self, now: u64) {
        let addrs: Vec<Maddr> = self.l1_table.keys().copied().collect();
        for addr in addrs {
            let Some(mut entry) = self.l1_table.remove(&addr) else {
                continue;
            };
            if self.l1_entry_update(addr, &mut entry, now) {
                self.l1_table.insert(addr, entry);
            } else {
                self.l1_vacancy += 1;
                if entry.core_req.is_some() {
                    self.core_ports_free += 1;
                }
            }
        }
    }

    /// Advance one entry by at most one state. Returns false once the
    /// entry is finished and its slot can be reclaimed.
    fn l1_entry_update(&mut self, addr: Maddr, entry: &mut L1Entry, now: u64) -> bool {
        match entry.state {
            L1State::ReadL1 => self.l1_read(addr, entry, now),
            L1State::ReadCat => self.l1_read_cat(addr, entry, now),
            L1State::SendReq => self.l1_send_req(entry),
            L1State::WaitRep => self.l1_wait_rep(addr, entry),
            L1State::FeedL1 => self.l1_feed(addr, entry, now),
            L1State::UpdateL1 => self.l1_update(addr, entry, now),
            L1State::SendRep => self.l1_send_rep(addr, entry, now),
            L1State::InvalidateAndRestart => self.l1_invalidate_and_restart(addr, entry, now),
        }
    }

    fn l1_read(&mut self, addr: Maddr, entry: &mut L1Entry, now: u64) -> bool {
        let Some(req) = entry.cache_req.clone() else {
            panic!("{}: L1 entry 0x{addr:x} reading without a cache request", self.entity);
        };
        match req.status() {
            CacheRequestStatus::New => {
                // Lost port arbitration; offer again.
                self.queue_l1_cache_req(&req);
                true
            }
            CacheRequestStatus::Wait => true,
            CacheRequestStatus::Hit => {
                if entry.inbound.is_some() {
                    self.l1_inbound_hit(addr, entry, now)
                } else {
                    self.metrics.l1_hits += 1;
                    self.finish_core(addr, entry, now)
                }
            }
            CacheRequestStatus::Miss => self.l1_read_miss(addr, entry, now),
        }
    }

    /// A directory order found its target line present.
    fn l1_inbound_hit(&mut self, addr: Maddr, entry: &mut L1Entry, now: u64) -> bool {
        let Some(msg) = entry.inbound.clone() else {
            unreachable!();
        };
        let Some(req) = entry.cache_req.clone() else {
            unreachable!();
        };
        match msg.kind {
            CoherenceMsgKind::InvReq => {
                // The Invalidate already removed the line. Only SHARED
                // copies receive invalidation orders, so the removed copy
                // must not carry unwritten data.
                debug_assert!(
                    req.line_copy().clone().is_none_or(|line| !line.dirty),
                    "{}: invalidated a dirty copy of 0x{addr:x}",
                    self.entity
                );
                entry.out_rep = Some(CoherenceMsg::new(
                    self.cfg.id,
                    msg.sender,
                    CoherenceMsgKind::InvRep,
                    addr,
                    0,
                    None,
                    now,
                ));
                entry.after_rep = AfterRep::Erase;
                entry.state = L1State::SendRep;
            }
            CoherenceMsgKind::FlushReq => {
                let Some(line) = req.line_copy().clone() else {
                    panic!("{}: flushed 0x{addr:x} without a line copy", self.entity);
                };
                entry.out_rep = Some(CoherenceMsg::new(
                    self.cfg.id,
                    msg.sender,
                    CoherenceMsgKind::FlushRep,
                    addr,
                    self.cfg.words_per_line,
                    Some(line.data),
                    now,
                ));
                entry.after_rep = AfterRep::Erase;
                entry.state = L1State::SendRep;
            }
            CoherenceMsgKind::WbReq => {
                // Capture the dirty payload, then downgrade in place.
                let Some(line) = req.line_copy().clone() else {
                    panic!("{}: writeback of 0x{addr:x} without a line copy", self.entity);
                };
                let home = line.annotation.home;
                entry.flush_data = Some(line.data);
                let downgrade = Rc::new(CacheRequest::new_update(
                    addr,
                    None,
                    Some(CacheAnnotation {
                        status: CacheStatus::Shared,
                        home,
                    }),
                    Some(false),
                ));
                self.queue_l1_cache_req(&downgrade);
                entry.cache_req = Some(downgrade);
                entry.state = L1State::UpdateL1;
            }
            _ => panic!("{}: {} is not an L1-bound request", self.entity, msg),
        }
        true
    }

    fn l1_read_miss(&mut self, addr: Maddr, entry: &mut L1Entry, now: u64) -> bool {
        let Some(req) = entry.cache_req.clone() else {
            unreachable!();
        };
        if let Some(msg) = entry.inbound.clone() {
            // The target line was already evicted; acknowledge without data
            // so the directory can retire the holder.
            entry.out_rep = Some(CoherenceMsg::new(
                self.cfg.id,
                msg.sender,
                CoherenceMsgKind::InvRep,
                addr,
                0,
                None,
                now,
            ));
            entry.after_rep = AfterRep::Erase;
            entry.state = L1State::SendRep;
            return true;
        }
        if let Some(victim) = req.take_victim() {
            // Evicted line goes home first; the reservation placed for the
            // requested line survives the restart.
            let (kind, word_count, data) = if victim.dirty {
                (
                    CoherenceMsgKind::FlushRep,
                    self.cfg.words_per_line,
                    Some(victim.data),
                )
            } else {
                (CoherenceMsgKind::InvRep, 0, None)
            };
            entry.out_rep = Some(CoherenceMsg::new(
                self.cfg.id,
                victim.annotation.home,
                kind,
                victim.start_maddr,
                word_count,
                data,
                now,
            ));
            entry.after_rep = AfterRep::Restart;
            entry.state = L1State::SendRep;
            return true;
        }
        let line = req.line_copy().clone();
        match line {
            Some(line) if !line.ready => {
                // Way reserved; find out who owns the directory entry.
                self.metrics.l1_misses += 1;
                let cat_req = Rc::new(CatRequest::new(addr));
                self.cat_q.push(cat_req.clone());
                entry.cat_req = Some(cat_req);
                entry.state = L1State::ReadCat;
                true
            }
            Some(line) => {
                // Present but unusable: a write against a SHARED copy. Drop
                // the copy, then re-run as an exclusive request.
                let is_upgrade = entry
                    .core_req
                    .as_ref()
                    .is_some_and(|c| c.req_type() != ReqType::Read)
                    && line.annotation.status == CacheStatus::Shared;
                assert!(
                    is_upgrade,
                    "{}: inconsistent L1 miss on a present line 0x{addr:x}",
                    self.entity
                );
                entry.prev_home = line.annotation.home;
                let inv = Rc::new(CacheRequest::new_invalidate(addr));
                self.queue_l1_cache_req(&inv);
                entry.cache_req = Some(inv);
                entry.state = L1State::InvalidateAndRestart;
                true
            }
            None => {
                // No way could be reserved this tick; look again.
                self.restart_core(entry);
                true
            }
        }
    }

    fn l1_read_cat(&mut self, addr: Maddr, entry: &mut L1Entry, now: u64) -> bool {
        let Some(cat_req) = entry.cat_req.clone() else {
            panic!("{}: L1 entry 0x{addr:x} in ReadCat without a request", self.entity);
        };
        match cat_req.status() {
            CatRequestStatus::New => {
                self.cat_q.push(cat_req);
                true
            }
            CatRequestStatus::Wait => true,
            CatRequestStatus::Done => {
                self.metrics.cat_lookups += 1;
                let Some(core) = entry.core_req.clone() else {
                    unreachable!();
                };
                let kind = if core.req_type() == ReqType::Read {
                    CoherenceMsgKind::ShReq
                } else {
                    CoherenceMsgKind::ExReq
                };
                entry.out_req = Some(CoherenceMsg::new(
                    self.cfg.id,
                    cat_req.home(),
                    kind,
                    addr,
                    self.cfg.words_per_line,
                    None,
                    now,
                ));
                entry.state = L1State::SendReq;
                true
            }
        }
    }

    fn l1_send_req(&mut self, entry: &mut L1Entry) -> bool {
        let Some(req) = entry.out_req.clone() else {
            unreachable!();
        };
        if req.won_arbitration.get() {
            req.won_arbitration.set(false);
            entry.state = L1State::WaitRep;
        } else if req.receiver == self.cfg.id {
            // Home is this tile; contend for the local directory table.
            self.l2_req_seeds.push(req);
        } else if req.sent.get() {
            req.sent.set(false);
            entry.state = L1State::WaitRep;
        } else {
            self.net_out
                .push((MsgClass::DirReq, NetPayload::Coherence(req)));
        }
        true
    }

    fn l1_wait_rep(&mut self, addr: Maddr, entry: &mut L1Entry) -> bool {
        let Some(rep) = entry.reply.take() else {
            return true;
        };
        let Some(core) = entry.core_req.clone() else {
            unreachable!();
        };
        let status = match rep.kind {
            CoherenceMsgKind::ShRep => CacheStatus::Shared,
            CoherenceMsgKind::ExRep => CacheStatus::Modified,
            _ => panic!("{}: unexpected grant {} for 0x{addr:x}", self.entity, rep),
        };
        let Some(mut data) = rep.data.clone() else {
            panic!("{}: grant {} without line data", self.entity, rep);
        };
        let mut dirty = false;
        if core.req_type() != ReqType::Read {
            // Merge the store into the granted line before installing it.
            let offset = (core.maddr() - addr) as usize / BYTES_PER_WORD;
            for (i, word) in core.data().iter().enumerate() {
                data[offset + i] = *word;
            }
            dirty = true;
        }
        let feed = Rc::new(CacheRequest::new_update(
            addr,
            Some(data),
            Some(CacheAnnotation {
                status,
                home: rep.sender,
            }),
            Some(dirty),
        ));
        self.queue_l1_cache_req(&feed);
        entry.cache_req = Some(feed);
        entry.state = L1State::FeedL1;
        true
    }

    fn l1_feed(&mut self, addr: Maddr, entry: &mut L1Entry, now: u64) -> bool {
        let Some(req) = entry.cache_req.clone() else {
            unreachable!();
        };
        match req.status() {
            CacheRequestStatus::New => {
                self.queue_l1_cache_req(&req);
                true
            }
            CacheRequestStatus::Wait => true,
            CacheRequestStatus::Hit => self.finish_core(addr, entry, now),
            CacheRequestStatus::Miss => {
                panic!("{}: feed of 0x{addr:x} missed its reservation", self.entity)
            }
        }
    }

    fn l1_update(&mut self, addr: Maddr, entry: &mut L1Entry, now: u64) -> bool {
        let Some(req) = entry.cache_req.clone() else {
            unreachable!();
        };
        match req.status() {
            CacheRequestStatus::New => {
                self.queue_l1_cache_req(&req);
                true
            }
            CacheRequestStatus::Wait => true,
            CacheRequestStatus::Hit => {
                let Some(msg) = entry.inbound.clone() else {
                    unreachable!();
                };
                entry.out_rep = Some(CoherenceMsg::new(
                    self.cfg.id,
                    msg.sender,
                    CoherenceMsgKind::WbRep,
                    addr,
                    self.cfg.words_per_line,
                    entry.flush_data.take(),
                    now,
                ));
                entry.after_rep = AfterRep::Erase;
                entry.state = L1State::SendRep;
                true
            }
            CacheRequestStatus::Miss => {
                panic!("{}: downgrade of 0x{addr:x} lost its line", self.entity)
            }
        }
    }

    fn l1_send_rep(&mut self, addr: Maddr, entry: &mut L1Entry, now: u64) -> bool {
        let Some(rep) = entry.out_rep.clone() else {
            panic!("{}: L1 entry 0x{addr:x} sending without a reply", self.entity);
        };
        let delivered = if rep.won_arbitration.get() {
            rep.won_arbitration.set(false);
            true
        } else if rep.receiver == self.cfg.id {
            self.local_rep_hand_off(&rep)
        } else if rep.sent.get() {
            rep.sent.set(false);
            true
        } else {
            self.net_out
                .push((MsgClass::Rep, NetPayload::Coherence(rep)));
            false
        };
        if !delivered {
            return true;
        }
        entry.out_rep = None;
        match entry.after_rep {
            AfterRep::Erase => false,
            AfterRep::Restart => {
                self.restart_core(entry);
                debug!(self.entity ; "L1 entry 0x{addr:x} restarting at {now}");
                true
            }
        }
    }

    /// A reply whose receiver is this tile's own directory. Delivered
    /// straight into a waiting entry, otherwise seeded for admission.
    fn local_rep_hand_off(&mut self, rep: &Rc<CoherenceMsg>) -> bool {
        if let Some(l2e) = self.l2_table.get_mut(&rep.maddr) {
            if l2e.awaits_replies() {
                l2e.pending_reps.push(rep.clone());
                return true;
            }
        }
        self.l2_rep_seeds.push(rep.clone());
        false
    }

    fn l1_invalidate_and_restart(&mut self, addr: Maddr, entry: &mut L1Entry, now: u64) -> bool {
        let Some(req) = entry.cache_req.clone() else {
            unreachable!();
        };
        match req.status() {
            CacheRequestStatus::New => {
                self.queue_l1_cache_req(&req);
                true
            }
            CacheRequestStatus::Wait => true,
            CacheRequestStatus::Hit => {
                // Tell the old home the copy is gone, then start over as a
                // plain miss.
                entry.out_rep = Some(CoherenceMsg::new(
                    self.cfg.id,
                    entry.prev_home,
                    CoherenceMsgKind::InvRep,
                    addr,
                    0,
                    None,
                    now,
                ));
                entry.after_rep = AfterRep::Restart;
                entry.state = L1State::SendRep;
                true
            }
            CacheRequestStatus::Miss => {
                // Raced with a directory invalidation; nothing to announce.
                self.restart_core(entry);
                true
            }
        }
    }

    /// Re-run the entry's core request from the initial lookup.
    fn restart_core(&mut self, entry: &mut L1Entry) {
        let Some(core) = entry.core_req.clone() else {
            panic!("{}: restart of an L1 entry without a core request", self.entity);
        };
        let req = Rc::new(core_cache_request(&core));
        self.queue_l1_cache_req(&req);
        entry.cache_req = Some(req);
        entry.cat_req = None;
        entry.out_req = None;
        entry.state = L1State::ReadL1;
    }

    /// Complete the core request from the hitting lookup and retire the
    /// entry.
    fn finish_core(&mut self, addr: Maddr, entry: &mut L1Entry, now: u64) -> bool {
        let Some(core) = entry.core_req.clone() else {
            unreachable!();
        };
        let Some(req) = entry.cache_req.clone() else {
            unreachable!();
        };
        if core.req_type() == ReqType::Read {
            let Some(line) = req.line_copy().clone() else {
                panic!("{}: read hit on 0x{addr:x} without a line copy", self.entity);
            };
            let offset = (core.maddr() - addr) as usize / BYTES_PER_WORD;
            core.set_data(&line.data[offset..offset + core.word_count()]);
            self.metrics.reads_served += 1;
        } else {
            self.metrics.writes_served += 1;
        }
        core.set_status(MemoryRequestStatus::Done);
        self.metrics.latency_sum += now.saturating_sub(entry.requested_at);
        debug!(self.entity ; "served {core} in {} ticks", now.saturating_sub(entry.requested_at));
        false
    }
}
