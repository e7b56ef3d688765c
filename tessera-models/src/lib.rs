// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Memory-system models for Tessera.
//!
//! The centre piece is the [coherence engine](crate::coherence): a
//! directory-based MSI protocol engine backing a private-L1 / shared-L2
//! memory system. Each tile of a simulated multicore runs one engine
//! instance which owns:
//!
//!   - a private L1 [cache](crate::cache),
//!   - a slice of the shared L2 together with its directory state,
//!   - an address-to-home [resolver](crate::cat),
//!   - optionally the [DRAM controller](crate::dram) for the system.
//!
//! Tiles exchange coherence and DRAM traffic as
//! [network messages](crate::coherence::messages) over an
//! [interconnect](crate::interconnect) built from the standard components.
//! The [tile](crate::tile) component drives the engine's two clock edges,
//! and the [core model](crate::core_model) issues synthetic read/write
//! traffic against it.

pub mod cache;
pub mod cat;
pub mod coherence;
pub mod core_model;
pub mod dram;
pub mod interconnect;
pub mod memory_request;
pub mod test_helpers;
pub mod tile;

/// A memory address in bytes.
pub type Maddr = u64;

/// Width of a data word in bytes.
pub const BYTES_PER_WORD: usize = 4;

/// Round `maddr` down to the start address of its containing line.
#[must_use]
pub fn start_maddr(maddr: Maddr, words_per_line: usize) -> Maddr {
    maddr - maddr % (words_per_line * BYTES_PER_WORD) as Maddr
}

/// Number of flits required to carry `bytes` over the interconnect.
#[must_use]
pub fn flit_count(bytes: usize, bytes_per_flit: usize) -> usize {
    bytes.div_ceil(bytes_per_flit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_alignment() {
        // 8 words of 4 bytes: 32-byte lines
        assert_eq!(start_maddr(0x0, 8), 0x0);
        assert_eq!(start_maddr(0x1f, 8), 0x0);
        assert_eq!(start_maddr(0x20, 8), 0x20);
        assert_eq!(start_maddr(0x47, 8), 0x40);
    }

    #[test]
    fn flits() {
        assert_eq!(flit_count(1, 8), 1);
        assert_eq!(flit_count(8, 8), 1);
        assert_eq!(flit_count(9, 8), 2);
        assert_eq!(flit_count(36, 8), 5);
    }
}
