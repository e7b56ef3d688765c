// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Core-issued memory accesses.
//!
//! A core hands a [`MemoryRequest`] to its tile's coherence engine and then
//! polls the request status. The engine answers `RETRY` when the request
//! loses port or table arbitration; the core is expected to
//! [resubmit](MemoryRequest::resubmit). Once the status reaches `DONE` the
//! result data of a read can be taken from the request.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;

use tessera_engine::types::ReqType;

use crate::Maddr;

/// Lifecycle of a [`MemoryRequest`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemoryRequestStatus {
    /// Not yet presented to, or not yet accepted by, the engine.
    New,
    /// Accepted and in flight.
    Wait,
    /// Lost arbitration; the issuer must resubmit.
    Retry,
    /// Complete. Read data is available.
    Done,
}

/// A single read or write issued by a core.
///
/// Shared as `Rc<MemoryRequest>` between the issuing core model and the
/// engine; all mutation goes through interior cells so both sides can hold
/// the request across ticks.
#[derive(Debug)]
pub struct MemoryRequest {
    maddr: Maddr,
    req_type: ReqType,
    word_count: usize,
    status: Cell<MemoryRequestStatus>,
    data: RefCell<Vec<u32>>,
}

impl MemoryRequest {
    /// Create a read of `word_count` words starting at `maddr`.
    #[must_use]
    pub fn new_read(maddr: Maddr, word_count: usize) -> Self {
        Self {
            maddr,
            req_type: ReqType::Read,
            word_count,
            status: Cell::new(MemoryRequestStatus::New),
            data: RefCell::new(Vec::new()),
        }
    }

    /// Create a write of `data` starting at `maddr`.
    #[must_use]
    pub fn new_write(maddr: Maddr, data: Vec<u32>) -> Self {
        let word_count = data.len();
        Self {
            maddr,
            req_type: ReqType::Write,
            word_count,
            status: Cell::new(MemoryRequestStatus::New),
            data: RefCell::new(data),
        }
    }

    pub fn maddr(&self) -> Maddr {
        self.maddr
    }

    pub fn req_type(&self) -> ReqType {
        self.req_type
    }

    pub fn is_read(&self) -> bool {
        self.req_type == ReqType::Read
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn status(&self) -> MemoryRequestStatus {
        self.status.get()
    }

    pub fn set_status(&self, status: MemoryRequestStatus) {
        self.status.set(status);
    }

    /// The write payload, or the read result once `DONE`.
    pub fn data(&self) -> Ref<'_, Vec<u32>> {
        self.data.borrow()
    }

    /// Install the result words of a completed read.
    pub fn set_data(&self, words: &[u32]) {
        *self.data.borrow_mut() = words.to_vec();
    }

    /// Return a `RETRY` request to `NEW` so it can be offered again.
    pub fn resubmit(&self) {
        assert_eq!(self.status.get(), MemoryRequestStatus::Retry);
        self.status.set(MemoryRequestStatus::New);
    }
}

impl fmt::Display for MemoryRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} 0x{:x} x{}",
            self.req_type, self.maddr, self.word_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_lifecycle() {
        let req = MemoryRequest::new_read(0x40, 2);
        assert_eq!(req.status(), MemoryRequestStatus::New);
        assert!(req.is_read());
        assert!(req.data().is_empty());

        req.set_status(MemoryRequestStatus::Wait);
        req.set_data(&[7, 8]);
        req.set_status(MemoryRequestStatus::Done);
        assert_eq!(*req.data(), vec![7, 8]);
    }

    #[test]
    fn retry_resubmit() {
        let req = MemoryRequest::new_write(0x80, vec![1, 2, 3]);
        assert_eq!(req.word_count(), 3);
        req.set_status(MemoryRequestStatus::Retry);
        req.resubmit();
        assert_eq!(req.status(), MemoryRequestStatus::New);
    }

    #[test]
    #[should_panic]
    fn resubmit_requires_retry() {
        let req = MemoryRequest::new_read(0x0, 1);
        req.resubmit();
    }
}
