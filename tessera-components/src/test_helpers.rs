// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Helpers shared by the arbiter tests and benchmarks.

use std::rc::Rc;

use tessera_engine::engine::Engine;

use crate::arbiter::{Arbiter, RoundRobinPolicy};
use crate::connect_port;
use crate::option_box_repeat;
use crate::sink::Sink;
use crate::source::Source;

/// Description of one arbiter input used to parameterise tests.
pub struct ArbiterInputData {
    pub val: usize,
    pub count: usize,
}

/// Check that every input value was granted exactly as many times as it was
/// offered.
pub fn check_grant_counts(inputs: &[ArbiterInputData], granted: Vec<usize>) {
    for input in inputs {
        let num_granted = granted.iter().filter(|&&v| v == input.val).count();
        assert_eq!(
            num_granted, input.count,
            "wrong number of grants for value {}",
            input.val
        );
    }
    let total: usize = inputs.iter().map(|i| i.count).sum();
    assert_eq!(granted.len(), total);
}

/// Build a sources -> arbiter -> sink pipeline over a round-robin policy.
///
/// The returned [Sink] can be queried after the engine has run.
pub fn round_robin_pipeline(engine: &mut Engine, inputs: &[ArbiterInputData]) -> Rc<Sink<usize>> {
    let spawner = engine.spawner.clone();
    let top = engine.top().clone();

    let arbiter = Arbiter::new_and_register(
        engine,
        &top,
        "arb",
        spawner,
        inputs.len(),
        Box::new(RoundRobinPolicy::new()),
    );

    for (i, input) in inputs.iter().enumerate() {
        let source = Source::new_and_register(
            engine,
            &top,
            format!("source_{i}").as_str(),
            option_box_repeat!(input.val ; input.count),
        );
        connect_port!(source, tx => arbiter, rx, i);
    }

    let sink = Sink::new_and_register(engine, &top, "sink");
    connect_port!(arbiter, tx => sink, rx);
    sink
}
