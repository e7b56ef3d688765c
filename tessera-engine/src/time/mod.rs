// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Simulation time.
//!
//! Time is managed as a set of [clocks](clock) multiplexed by
//! [SimTime](simtime). Each clock tick is split into phases so that clocked
//! models can do work on the positive edge (phase 0) and commit state on the
//! negative edge (phase 1).

pub mod clock;
pub mod simtime;
