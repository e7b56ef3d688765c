// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! The DRAM work table on the memory-owning node.
//!
//! Only reads get an entry; their reply carries the same request object
//! back to the asking directory. Writebacks are fire-and-forget and are
//! retired by the controller itself.

use std::rc::Rc;

use super::messages::{DramMsg, MsgClass, NetPayload};
use super::MsiEngine;
use crate::dram::DramRequestStatus;
use crate::Maddr;

/// One outstanding DRAM read, keyed by line start address.
pub(crate) struct DramEntry {
    pub(crate) msg: Rc<DramMsg>,
    pub(crate) rep: Option<Rc<DramMsg>>,
}

impl DramEntry {
    pub(crate) fn new(msg: Rc<DramMsg>) -> Self {
        Self { msg, rep: None }
    }
}

impl MsiEngine {
    pub(crate) fn dram_work_table_update(&mut self, now: u64) {
        let addrs: Vec<Maddr> = self.dram_table.keys().copied().collect();
        for addr in addrs {
            let Some(mut entry) = self.dram_table.remove(&addr) else {
                continue;
            };
            if self.dram_entry_update(&mut entry, now) {
                self.dram_table.insert(addr, entry);
            }
        }
    }

    fn dram_entry_update(&mut self, entry: &mut DramEntry, now: u64) -> bool {
        if entry.msg.req.status() != DramRequestStatus::Done {
            return true;
        }
        let rep = entry
            .rep
            .get_or_insert_with(|| {
                DramMsg::new(self.cfg.id, entry.msg.sender, entry.msg.req.clone(), now)
            })
            .clone();
        if rep.receiver == self.cfg.id {
            // The asking directory is on this very tile.
            self.deliver_dram_rep_to_l2(&rep);
            return false;
        }
        if rep.sent.get() {
            rep.sent.set(false);
            return false;
        }
        self.net_out.push((MsgClass::DramRep, NetPayload::Dram(rep)));
        true
    }
}
