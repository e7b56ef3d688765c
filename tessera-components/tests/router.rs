// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

use tessera_components::connect_port;
use tessera_components::router::{DefaultRouter, Router};
use tessera_components::sink::Sink;
use tessera_components::source::Source;
use tessera_engine::run_simulation;
use tessera_engine::test_helpers::start_test;

/// The default router steers each value to the output matching its
/// destination; alternating destinations split the stream evenly.
#[test]
fn routes_by_destination() {
    let mut engine = start_test(file!());

    const NUM_PUTS: usize = 50;

    let iter = Box::new((0..2).cycle().take(NUM_PUTS));
    let top = engine.top().clone();
    let source = Source::new_and_register(&engine, &top, "source", Some(iter));
    let router = Router::new_and_register(&engine, &top, "router", 2, Box::new(DefaultRouter {}));
    let sink_a = Sink::new_and_register(&engine, &top, "sink_a");
    let sink_b = Sink::new_and_register(&engine, &top, "sink_b");

    connect_port!(source, tx => router, rx);
    connect_port!(router, tx, 0 => sink_a, rx);
    connect_port!(router, tx, 1 => sink_b, rx);

    run_simulation!(engine);

    assert_eq!(sink_a.num_sunk(), NUM_PUTS / 2);
    assert_eq!(sink_b.num_sunk(), NUM_PUTS / 2);
}
