// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Helpers to reduce boilerplate at the start of tests.

use tessera_track::Tracker;
use tessera_track::tracker::stdout_tracker;

use crate::engine::Engine;

/// Create the tracker to be used by a test.
pub fn create_tracker(test_name: &str) -> Tracker {
    println!("Running test: {test_name}");
    stdout_tracker()
}

/// Create an [Engine] for a test, logging the test name so that interleaved
/// output can be attributed.
pub fn start_test(test_name: &str) -> Engine {
    let tracker = create_tracker(test_name);
    Engine::new(&tracker)
}
