// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Events used to coordinate simulation tasks.
//!
//! All events implement the [Event](crate::traits::Event) trait so they can
//! be combined with [AnyOf](any_of::AnyOf) and [AllOf](all_of::AllOf) and
//! passed to [run_until](crate::engine::Engine::run_until).

pub mod all_of;
pub mod any_of;
pub mod once;
pub mod repeated;
