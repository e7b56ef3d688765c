// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Directory-side transactions on the local L2 slice.
//!
//! An [`L2Entry`] serializes all traffic for one line: an SH_REQ/EX_REQ
//! being granted, a stray reply being folded in, or a victimized
//! directory line being reclaimed. While the entry is open its working
//! copy of the line is authoritative; the array is only brought up to
//! date by the final Update.
//!
//! Grants never target the requester with an invalidation: the requester
//! is removed from the sharer set before the gather round is computed, so
//! an upgrade (write to a line the requester already shares) cannot
//! deadlock against itself.

use std::rc::Rc;
use std::sync::Arc;

use tessera_track::debug;
use tessera_track::entity::Entity;

use super::annotations::{DirAnnotation, DirStatus};
use super::messages::{CoherenceMsg, CoherenceMsgKind, DramMsg, MsgClass, NetPayload};
use super::{L1Seed, MsiEngine};
use crate::cache::{CacheLine, CacheRequest, CacheRequestStatus};
use crate::dram::DramRequest;
use crate::Maddr;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum L2State {
    /// Look the directory line up in the L2 array.
    ReadL2,
    /// Orders are out; fold replies until the line is quiet enough.
    SendDirReqWaitDirRep,
    /// Commit the working copy back to the array.
    UpdateL2AndFinish,
    /// Offer the grant to the requester.
    SendRep,
    /// Offer the DRAM read that fills a missing line.
    SendDramFeedReq,
    /// Block until the DRAM reply is delivered.
    WaitDramFeed,
    /// Offer the DRAM write that retires a dirty victim.
    DramWriteback,
    /// The victim is gone; free the address for blocked requesters.
    InvalidL2AndRestart,
}

/// One in-flight directory transaction, keyed by line start address.
pub(crate) struct L2Entry {
    pub(crate) state: L2State,
    pub(crate) req_msg: Option<Rc<CoherenceMsg>>,
    /// A reply that arrived with no waiting entry, to be folded in.
    pub(crate) rep_msg: Option<Rc<CoherenceMsg>>,
    pub(crate) cache_req: Option<Rc<CacheRequest<DirAnnotation>>>,
    /// Working copy of the directory line.
    pub(crate) line: Option<CacheLine<DirAnnotation>>,
    pub(crate) pending_dir_reqs: Vec<Rc<CoherenceMsg>>,
    pub(crate) pending_reps: Vec<Rc<CoherenceMsg>>,
    pub(crate) out_rep: Option<Rc<CoherenceMsg>>,
    pub(crate) dram_msg: Option<Rc<DramMsg>>,
    pub(crate) dram_rep: Option<Rc<DramMsg>>,
    /// Set while installing a DRAM fill; suppresses hit accounting on the
    /// re-read that serves the request.
    pub(crate) feeding: bool,
    /// This entry reclaims an evicted directory line.
    pub(crate) victim: bool,
    /// A victim evicted by this entry's lookup, held until its own
    /// reclamation entry can be opened.
    pub(crate) victim_line: Option<CacheLine<DirAnnotation>>,
    pub(crate) requested_at: u64,
}

impl L2Entry {
    fn empty(now: u64) -> Self {
        Self {
            state: L2State::ReadL2,
            req_msg: None,
            rep_msg: None,
            cache_req: None,
            line: None,
            pending_dir_reqs: Vec::new(),
            pending_reps: Vec::new(),
            out_rep: None,
            dram_msg: None,
            dram_rep: None,
            feeding: false,
            victim: false,
            victim_line: None,
            requested_at: now,
        }
    }

    pub(crate) fn for_req(
        msg: Rc<CoherenceMsg>,
        cache_req: Rc<CacheRequest<DirAnnotation>>,
        now: u64,
    ) -> Self {
        Self {
            req_msg: Some(msg),
            cache_req: Some(cache_req),
            ..Self::empty(now)
        }
    }

    pub(crate) fn for_rep(
        msg: Rc<CoherenceMsg>,
        cache_req: Rc<CacheRequest<DirAnnotation>>,
        now: u64,
    ) -> Self {
        Self {
            rep_msg: Some(msg),
            cache_req: Some(cache_req),
            ..Self::empty(now)
        }
    }

    pub(crate) fn awaits_replies(&self) -> bool {
        self.state == L2State::SendDirReqWaitDirRep
    }

    pub(crate) fn accept_dram_rep(&mut self, entity: &Arc<Entity>, msg: Rc<DramMsg>) {
        assert_eq!(
            self.state,
            L2State::WaitDramFeed,
            "{entity}: {msg} delivered to an L2 entry that is not waiting"
        );
        assert!(
            self.dram_rep.is_none(),
            "{entity}: duplicate DRAM reply {msg} for a waiting L2 entry"
        );
        self.dram_rep = Some(msg);
    }
}

/// Fold one gathered reply into the working directory line.
fn fold_rep(line: &mut CacheLine<DirAnnotation>, rep: &CoherenceMsg) {
    match rep.kind {
        CoherenceMsgKind::InvRep | CoherenceMsgKind::FlushRep => {
            line.annotation.sharers.remove(&rep.sender);
        }
        // The sender downgraded in place and keeps a readable copy.
        CoherenceMsgKind::WbRep => {
            line.annotation.status = DirStatus::Readers;
        }
        _ => panic!("cannot fold {rep} into a directory line"),
    }
    if matches!(rep.kind, CoherenceMsgKind::FlushRep | CoherenceMsgKind::WbRep) {
        if let Some(data) = &rep.data {
            line.data = data.clone();
            line.dirty = true;
        }
    }
    if line.annotation.status == DirStatus::Writer && line.annotation.sharers.is_empty() {
        line.annotation.status = DirStatus::Readers;
    }
}

impl MsiEngine {
    pub(crate) fn l2_work_table_update(&mut self, now: u64) {
        let addrs: Vec<Maddr> = self.l2_table.keys().copied().collect();
        for addr in addrs {
            let Some(mut entry) = self.l2_table.remove(&addr) else {
                continue;
            };
            if self.l2_entry_update(addr, &mut entry, now) {
                self.l2_table.insert(addr, entry);
                continue;
            }
            self.l2_vacancy += 1;
            // A finishing entry may still hold an unreclaimed victim,
            // which must never be dropped while dirty or shared. The
            // slot just freed can host the reclamation round; if the
            // victim's address is still occupied, keep holding the slot
            // and retry next tick.
            if entry.victim_line.is_some() {
                self.try_spawn_victim(&mut entry, now);
                if entry.victim_line.is_some() {
                    self.l2_vacancy -= 1;
                    entry.state = L2State::InvalidL2AndRestart;
                    self.l2_table.insert(addr, entry);
                }
            }
        }
    }

    fn l2_entry_update(&mut self, addr: Maddr, entry: &mut L2Entry, now: u64) -> bool {
        // A held victim gets its own reclamation entry as soon as a slot
        // for its address is free.
        if entry.victim_line.is_some() {
            self.try_spawn_victim(entry, now);
        }
        match entry.state {
            L2State::ReadL2 => self.l2_read(addr, entry, now),
            L2State::SendDirReqWaitDirRep => self.l2_gather(addr, entry, now),
            L2State::UpdateL2AndFinish => self.l2_update_and_finish(addr, entry),
            L2State::SendRep => self.l2_send_rep(entry),
            L2State::SendDramFeedReq => self.l2_send_dram(entry, L2State::WaitDramFeed),
            L2State::WaitDramFeed => self.l2_wait_dram_feed(addr, entry),
            L2State::DramWriteback => {
                // Feeds of this line yield until the writeback is issued.
                self.writeback_addrs.insert(addr);
                self.l2_send_dram(entry, L2State::InvalidL2AndRestart)
            }
            L2State::InvalidL2AndRestart => {
                debug!(self.entity ; "directory entry for 0x{addr:x} closed");
                false
            }
        }
    }

    fn l2_read(&mut self, addr: Maddr, entry: &mut L2Entry, now: u64) -> bool {
        let Some(req) = entry.cache_req.clone() else {
            panic!("{}: L2 entry 0x{addr:x} reading without a cache request", self.entity);
        };
        match req.status() {
            CacheRequestStatus::New => {
                self.queue_l2_cache_req(&req);
                true
            }
            CacheRequestStatus::Wait => true,
            CacheRequestStatus::Hit => {
                entry.line = req.line_copy().clone();
                if entry.rep_msg.is_some() {
                    self.l2_fold_stray_rep(addr, entry)
                } else {
                    if !entry.feeding {
                        self.metrics.l2_hits += 1;
                    }
                    // The fill has been read back; accounting is done.
                    entry.feeding = false;
                    self.l2_serve(addr, entry, now)
                }
            }
            CacheRequestStatus::Miss => self.l2_read_miss(addr, entry, now),
        }
    }

    /// A reply with no waiting entry: merge it into the directory line.
    fn l2_fold_stray_rep(&mut self, addr: Maddr, entry: &mut L2Entry) -> bool {
        let Some(rep) = entry.rep_msg.take() else {
            unreachable!();
        };
        let Some(mut line) = entry.line.take() else {
            panic!("{}: stray {} hit 0x{addr:x} without a line copy", self.entity, rep);
        };
        fold_rep(&mut line, &rep);
        let update = Rc::new(CacheRequest::new_update(
            addr,
            Some(line.data.clone()),
            Some(line.annotation.clone()),
            Some(line.dirty),
        ));
        self.queue_l2_cache_req(&update);
        entry.cache_req = Some(update);
        entry.state = L2State::UpdateL2AndFinish;
        true
    }

    /// Decide whether the request can be granted from the current sharer
    /// set or a gather round is needed first.
    fn l2_serve(&mut self, addr: Maddr, entry: &mut L2Entry, now: u64) -> bool {
        let Some(msg) = entry.req_msg.clone() else {
            panic!("{}: L2 entry 0x{addr:x} serving without a request", self.entity);
        };
        let Some(line) = entry.line.as_mut() else {
            unreachable!();
        };
        // The requester never has to invalidate itself.
        line.annotation.sharers.remove(&msg.sender);
        let exclusive = msg.kind == CoherenceMsgKind::ExReq;
        let can_grant = line.annotation.sharers.is_empty()
            || (!exclusive && line.annotation.status == DirStatus::Readers);
        if can_grant {
            self.l2_grant(addr, entry, now);
            return true;
        }
        let mut orders = Vec::new();
        match line.annotation.status {
            DirStatus::Writer => {
                let Some(&writer) = line.annotation.sharers.iter().next() else {
                    unreachable!();
                };
                let kind = if exclusive {
                    CoherenceMsgKind::FlushReq
                } else {
                    CoherenceMsgKind::WbReq
                };
                orders.push(CoherenceMsg::new(
                    self.cfg.id,
                    writer,
                    kind,
                    addr,
                    self.cfg.words_per_line,
                    None,
                    now,
                ));
            }
            DirStatus::Readers => {
                for &reader in &line.annotation.sharers {
                    orders.push(CoherenceMsg::new(
                        self.cfg.id,
                        reader,
                        CoherenceMsgKind::InvReq,
                        addr,
                        0,
                        None,
                        now,
                    ));
                }
            }
        }
        debug!(self.entity ; "gathering {} holders of 0x{addr:x}", orders.len());
        entry.pending_dir_reqs = orders;
        entry.state = L2State::SendDirReqWaitDirRep;
        true
    }

    /// Grant from the working copy and commit the new directory state.
    fn l2_grant(&mut self, addr: Maddr, entry: &mut L2Entry, now: u64) {
        let Some(msg) = entry.req_msg.clone() else {
            unreachable!();
        };
        let Some(line) = entry.line.as_mut() else {
            unreachable!();
        };
        let exclusive = msg.kind == CoherenceMsgKind::ExReq;
        line.annotation.sharers.insert(msg.sender);
        line.annotation.status = if exclusive {
            DirStatus::Writer
        } else {
            DirStatus::Readers
        };
        entry.out_rep = Some(CoherenceMsg::new(
            self.cfg.id,
            msg.sender,
            if exclusive {
                CoherenceMsgKind::ExRep
            } else {
                CoherenceMsgKind::ShRep
            },
            addr,
            self.cfg.words_per_line,
            Some(line.data.clone()),
            now,
        ));
        let update = Rc::new(CacheRequest::new_update(
            addr,
            Some(line.data.clone()),
            Some(line.annotation.clone()),
            Some(line.dirty),
        ));
        self.queue_l2_cache_req(&update);
        entry.cache_req = Some(update);
        entry.state = L2State::UpdateL2AndFinish;
    }

    fn l2_read_miss(&mut self, addr: Maddr, entry: &mut L2Entry, now: u64) -> bool {
        let Some(req) = entry.cache_req.clone() else {
            unreachable!();
        };
        if entry.rep_msg.is_some() {
            panic!(
                "{}: reply for 0x{addr:x} but no directory line at node {}",
                self.entity, self.cfg.id
            );
        }
        if let Some(victim) = req.take_victim() {
            entry.victim_line = Some(victim);
            self.try_spawn_victim(entry, now);
        }
        let line = req.line_copy().clone();
        match line {
            Some(line) if !line.ready => {
                // Way reserved; fetch the line from memory.
                self.metrics.l2_misses += 1;
                let feed = Rc::new(DramRequest::new_read(addr, self.cfg.words_per_line));
                entry.dram_msg = Some(DramMsg::new(self.cfg.id, self.cfg.dram_node, feed, now));
                entry.state = L2State::SendDramFeedReq;
                true
            }
            Some(_) => panic!(
                "{}: directory lookup missed a ready line 0x{addr:x}",
                self.entity
            ),
            None => {
                // No way could be reserved this tick; look again.
                let retry =
                    Rc::new(CacheRequest::new_read(addr, self.cfg.words_per_line).allocating());
                self.queue_l2_cache_req(&retry);
                entry.cache_req = Some(retry);
                true
            }
        }
    }

    /// Fold arrived replies, then either finish the round or keep offering
    /// the outstanding orders.
    fn l2_gather(&mut self, addr: Maddr, entry: &mut L2Entry, now: u64) -> bool {
        let reps = std::mem::take(&mut entry.pending_reps);
        {
            let Some(line) = entry.line.as_mut() else {
                panic!("{}: gather on 0x{addr:x} without a working line", self.entity);
            };
            for rep in &reps {
                fold_rep(line, rep);
            }
        }
        let Some(line) = entry.line.as_ref() else {
            unreachable!();
        };
        let terminal = if entry.victim {
            line.annotation.sharers.is_empty()
        } else {
            let exclusive = entry
                .req_msg
                .as_ref()
                .is_some_and(|m| m.kind == CoherenceMsgKind::ExReq);
            if exclusive {
                line.annotation.sharers.is_empty()
            } else {
                line.annotation.status == DirStatus::Readers
            }
        };
        if !terminal {
            let orders = entry.pending_dir_reqs.clone();
            for order in orders {
                if order.receiver == self.cfg.id {
                    if !order.won_arbitration.get() {
                        self.l1_seeds.push(L1Seed::Msg(order));
                    }
                } else if !order.sent.get() {
                    self.net_out
                        .push((MsgClass::CacheReq, NetPayload::Coherence(order)));
                }
            }
            return true;
        }
        entry.pending_dir_reqs.clear();
        if entry.victim {
            if line.dirty {
                let wb = Rc::new(DramRequest::new_write(addr, line.data.clone()));
                entry.dram_msg = Some(DramMsg::new(self.cfg.id, self.cfg.dram_node, wb, now));
                entry.state = L2State::DramWriteback;
                return true;
            }
            // Clean victim: nothing to retire.
            return false;
        }
        self.l2_grant(addr, entry, now);
        true
    }

    fn l2_update_and_finish(&mut self, addr: Maddr, entry: &mut L2Entry) -> bool {
        let Some(req) = entry.cache_req.clone() else {
            unreachable!();
        };
        match req.status() {
            CacheRequestStatus::New => {
                self.queue_l2_cache_req(&req);
                true
            }
            CacheRequestStatus::Wait => true,
            CacheRequestStatus::Hit => {
                if entry.feeding {
                    // The fill is installed; re-read it to serve the
                    // request.
                    let read =
                        Rc::new(CacheRequest::new_read(addr, self.cfg.words_per_line));
                    self.queue_l2_cache_req(&read);
                    entry.cache_req = Some(read);
                    entry.state = L2State::ReadL2;
                    true
                } else if entry.out_rep.is_some() {
                    entry.state = L2State::SendRep;
                    true
                } else {
                    false
                }
            }
            CacheRequestStatus::Miss => {
                panic!("{}: directory update of 0x{addr:x} missed", self.entity)
            }
        }
    }

    fn l2_send_rep(&mut self, entry: &mut L2Entry) -> bool {
        let Some(rep) = entry.out_rep.clone() else {
            unreachable!();
        };
        if rep.receiver == self.cfg.id {
            // The requester is this tile's own L1.
            self.deliver_rep_to_l1(&rep);
            return false;
        }
        if rep.sent.get() {
            rep.sent.set(false);
            return false;
        }
        self.net_out
            .push((MsgClass::Rep, NetPayload::Coherence(rep)));
        true
    }

    /// Offer a DRAM message (locally or over the network) and advance to
    /// `next` once it is handed over.
    fn l2_send_dram(&mut self, entry: &mut L2Entry, next: L2State) -> bool {
        let Some(msg) = entry.dram_msg.clone() else {
            unreachable!();
        };
        if msg.sent.get() {
            msg.sent.set(false);
            entry.state = next;
        } else if msg.receiver == self.cfg.id {
            self.dram_seeds.push(msg);
        } else {
            self.net_out
                .push((MsgClass::DramReq, NetPayload::Dram(msg)));
        }
        true
    }

    fn l2_wait_dram_feed(&mut self, addr: Maddr, entry: &mut L2Entry) -> bool {
        let Some(rep) = entry.dram_rep.take() else {
            return true;
        };
        let data = rep.req.data().clone();
        let update = Rc::new(CacheRequest::new_update(
            addr,
            Some(data),
            Some(DirAnnotation::default()),
            Some(false),
        ));
        self.queue_l2_cache_req(&update);
        entry.cache_req = Some(update);
        entry.feeding = true;
        entry.state = L2State::UpdateL2AndFinish;
        true
    }

    /// Open a reclamation entry for a victimized directory line.
    fn try_spawn_victim(&mut self, entry: &mut L2Entry, now: u64) {
        let Some(line) = entry.victim_line.as_ref() else {
            return;
        };
        let vaddr = line.start_maddr;
        if self.l2_vacancy == 0 || self.l2_table.contains_key(&vaddr) {
            return;
        }
        let Some(line) = entry.victim_line.take() else {
            unreachable!();
        };
        if line.annotation.sharers.is_empty() && !line.dirty {
            // Nobody holds it and memory is current.
            return;
        }
        let mut victim = L2Entry::empty(now);
        victim.victim = true;
        if line.annotation.sharers.is_empty() {
            let wb = Rc::new(DramRequest::new_write(vaddr, line.data.clone()));
            victim.dram_msg = Some(DramMsg::new(self.cfg.id, self.cfg.dram_node, wb, now));
            victim.state = L2State::DramWriteback;
        } else {
            let mut orders = Vec::new();
            match line.annotation.status {
                DirStatus::Writer => {
                    let Some(&writer) = line.annotation.sharers.iter().next() else {
                        unreachable!();
                    };
                    orders.push(CoherenceMsg::new(
                        self.cfg.id,
                        writer,
                        CoherenceMsgKind::FlushReq,
                        vaddr,
                        self.cfg.words_per_line,
                        None,
                        now,
                    ));
                }
                DirStatus::Readers => {
                    for &reader in &line.annotation.sharers {
                        orders.push(CoherenceMsg::new(
                            self.cfg.id,
                            reader,
                            CoherenceMsgKind::InvReq,
                            vaddr,
                            0,
                            None,
                            now,
                        ));
                    }
                }
            }
            victim.pending_dir_reqs = orders;
            victim.state = L2State::SendDirReqWaitDirRep;
        }
        victim.line = Some(line);
        debug!(self.entity ; "reclaiming victimized directory line 0x{vaddr:x}");
        self.l2_table.insert(vaddr, victim);
        self.l2_vacancy -= 1;
    }
}
