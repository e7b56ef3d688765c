// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Shared types.
//!
//! This file defines a number of common types used to connect blocks.

use tessera_engine::types::SimError;

/// The `DataGenerator` is what a [source](crate::source) uses
/// to generate data values to send.
pub type DataGenerator<T> = Box<dyn Iterator<Item = T> + 'static>;

/// The return value from a call to a fallible component accessor.
///
/// It can either return a value or a [SimError].
pub type GetResult<T> = Result<T, SimError>;
