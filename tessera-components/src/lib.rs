// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Simulation components.

pub mod arbiter;
pub mod connect;
pub mod delay;
pub mod router;
pub mod sink;
pub mod source;
pub mod store;
pub mod test_helpers;
pub mod types;
