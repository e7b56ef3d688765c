// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

use tessera_components::sink::Sink;
use tessera_components::source::Source;
use tessera_components::{connect_port, option_box_repeat};
use tessera_engine::test_helpers::start_test;

/// Wiring one output into two consumers is a model bug and must fail at
/// connection time, not at runtime.
#[test]
#[should_panic(expected = "top::source: tx already connected")]
fn connect_outport_twice() {
    let engine = start_test(file!());

    let top = engine.top().clone();
    let source = Source::new_and_register(&engine, &top, "source", option_box_repeat!(1 ; 1));

    let sink1 = Sink::new_and_register(&engine, &top, "sink1");
    let sink2 = Sink::new_and_register(&engine, &top, "sink2");

    connect_port!(source, tx => sink1, rx);
    connect_port!(source, tx => sink2, rx);
}
