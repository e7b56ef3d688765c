// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Coherence and DRAM messages, and their network envelope.
//!
//! A [`CoherenceMsg`] or [`DramMsg`] is built once by a work-table entry
//! and then offered for admission every tick until one of its single-shot
//! flags fires:
//!
//!   - `sent` is set when the message wins network egress (or is handed to
//!     the DRAM controller); the *sender's* entry advances on it.
//!   - `won_arbitration` is set when the *receiver* matches the message to
//!     a work-table slot; the two-phase receive handshake pops the message
//!     from its queue on the following tick.
//!
//! Between tiles, messages travel wrapped in a [`NetMsg`] envelope which
//! carries routing and flit-accounting information and implements
//! [`SimObject`] so it can flow through the standard components.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tessera_engine::traits::{Routable, SimObject, TotalBytes};
use tessera_engine::types::ReqType;
use tessera_track::create_tag;
use tessera_track::entity::Entity;
use tessera_track::tag::{Tag, Tagged};

use crate::Maddr;
use crate::dram::DramRequest;

/// The ten MSI protocol message kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CoherenceMsgKind {
    /// Request a readable copy from the directory.
    ShReq,
    /// Request the writable copy from the directory.
    ExReq,
    /// Directory orders a holder to drop its copy.
    InvReq,
    /// Directory orders the writer to downgrade to shared.
    WbReq,
    /// Directory orders the writer to return data and drop its copy.
    FlushReq,
    ShRep,
    ExRep,
    InvRep,
    WbRep,
    FlushRep,
}

impl CoherenceMsgKind {
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Self::ShReq | Self::ExReq | Self::InvReq | Self::WbReq | Self::FlushReq
        )
    }

    /// Which bounded queue pair carries this kind.
    pub fn class(&self) -> MsgClass {
        match self {
            Self::ShReq | Self::ExReq => MsgClass::DirReq,
            Self::InvReq | Self::WbReq | Self::FlushReq => MsgClass::CacheReq,
            _ => MsgClass::Rep,
        }
    }
}

/// Message classes. Each tile keeps one bounded send queue and one bounded
/// receive queue per class.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MsgClass {
    /// Directory-originated requests to an L1 (INV/WB/FLUSH).
    CacheReq,
    /// L1-originated requests to a directory (SH/EX).
    DirReq,
    /// All coherence replies.
    Rep,
    DramReq,
    DramRep,
}

impl MsgClass {
    pub const COUNT: usize = 5;
    pub const ALL: [MsgClass; Self::COUNT] = [
        MsgClass::CacheReq,
        MsgClass::DirReq,
        MsgClass::Rep,
        MsgClass::DramReq,
        MsgClass::DramRep,
    ];

    pub fn index(&self) -> usize {
        match self {
            MsgClass::CacheReq => 0,
            MsgClass::DirReq => 1,
            MsgClass::Rep => 2,
            MsgClass::DramReq => 3,
            MsgClass::DramRep => 4,
        }
    }
}

/// One protocol message between an L1 and a directory.
#[derive(Debug)]
pub struct CoherenceMsg {
    pub sender: u32,
    pub receiver: u32,
    pub kind: CoherenceMsgKind,
    /// Line-aligned target address.
    pub maddr: Maddr,
    pub word_count: usize,
    pub data: Option<Vec<u32>>,
    pub sent: Cell<bool>,
    pub won_arbitration: Cell<bool>,
    pub birthtime: u64,
}

impl CoherenceMsg {
    #[must_use]
    pub fn new(
        sender: u32,
        receiver: u32,
        kind: CoherenceMsgKind,
        maddr: Maddr,
        word_count: usize,
        data: Option<Vec<u32>>,
        birthtime: u64,
    ) -> Rc<Self> {
        Rc::new(Self {
            sender,
            receiver,
            kind,
            maddr,
            word_count,
            data,
            sent: Cell::new(false),
            won_arbitration: Cell::new(false),
            birthtime,
        })
    }
}

impl fmt::Display for CoherenceMsg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:?} 0x{:x} {}->{}",
            self.kind, self.maddr, self.sender, self.receiver
        )
    }
}

/// A DRAM access in flight between a directory and the DRAM-owning node.
#[derive(Debug)]
pub struct DramMsg {
    pub sender: u32,
    pub receiver: u32,
    pub req: Rc<DramRequest>,
    pub sent: Cell<bool>,
    pub won_arbitration: Cell<bool>,
    pub birthtime: u64,
}

impl DramMsg {
    #[must_use]
    pub fn new(sender: u32, receiver: u32, req: Rc<DramRequest>, birthtime: u64) -> Rc<Self> {
        Rc::new(Self {
            sender,
            receiver,
            req,
            sent: Cell::new(false),
            won_arbitration: Cell::new(false),
            birthtime,
        })
    }
}

impl fmt::Display for DramMsg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} dram 0x{:x} {}->{}",
            self.req.req_type(),
            self.req.maddr(),
            self.sender,
            self.receiver
        )
    }
}

/// The payload of a network envelope.
#[derive(Clone, Debug)]
pub enum NetPayload {
    Coherence(Rc<CoherenceMsg>),
    Dram(Rc<DramMsg>),
}

impl NetPayload {
    /// Arm the sender-side admission flag of the wrapped message.
    pub fn set_sent(&self) {
        match self {
            NetPayload::Coherence(msg) => msg.sent.set(true),
            NetPayload::Dram(msg) => msg.sent.set(true),
        }
    }
}

/// The envelope tiles exchange over the interconnect.
#[derive(Clone, Debug)]
pub struct NetMsg {
    created_by: Tag,
    tag: Tag,
    pub src: u32,
    pub dest: u32,
    pub class: MsgClass,
    pub flits: usize,
    bytes: usize,
    pub payload: NetPayload,
}

impl NetMsg {
    #[must_use]
    pub fn new(
        entity: &Arc<Entity>,
        src: u32,
        dest: u32,
        class: MsgClass,
        flits: usize,
        bytes: usize,
        payload: NetPayload,
    ) -> Self {
        Self {
            created_by: entity.tag,
            tag: create_tag!(entity),
            src,
            dest,
            class,
            flits,
            bytes,
            payload,
        }
    }

    pub fn created_by(&self) -> Tag {
        self.created_by
    }
}

impl fmt::Display for NetMsg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:?} {}->{} ({} flits): {}",
            self.class,
            self.src,
            self.dest,
            self.flits,
            match &self.payload {
                NetPayload::Coherence(msg) => msg.to_string(),
                NetPayload::Dram(msg) => msg.to_string(),
            }
        )
    }
}

impl Tagged for NetMsg {
    fn tag(&self) -> Tag {
        self.tag
    }
}

impl TotalBytes for NetMsg {
    fn total_bytes(&self) -> usize {
        self.bytes
    }
}

impl Routable for NetMsg {
    fn dest(&self) -> u64 {
        self.dest as u64
    }

    fn req_type(&self) -> ReqType {
        match &self.payload {
            NetPayload::Dram(msg) => msg.req.req_type(),
            NetPayload::Coherence(msg) => {
                if msg.kind.is_request() {
                    ReqType::Control
                } else {
                    ReqType::Read
                }
            }
        }
    }
}

impl SimObject for NetMsg {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_classify() {
        assert!(CoherenceMsgKind::ShReq.is_request());
        assert!(!CoherenceMsgKind::FlushRep.is_request());
        assert_eq!(CoherenceMsgKind::ShReq.class(), MsgClass::DirReq);
        assert_eq!(CoherenceMsgKind::InvReq.class(), MsgClass::CacheReq);
        assert_eq!(CoherenceMsgKind::WbRep.class(), MsgClass::Rep);
    }

    #[test]
    fn class_indices_cover_all() {
        for (i, class) in MsgClass::ALL.iter().enumerate() {
            assert_eq!(class.index(), i);
        }
    }

    #[test]
    fn admission_flags_start_clear() {
        let msg = CoherenceMsg::new(0, 1, CoherenceMsgKind::ShReq, 0x40, 8, None, 0);
        assert!(!msg.sent.get());
        assert!(!msg.won_arbitration.get());
    }
}
