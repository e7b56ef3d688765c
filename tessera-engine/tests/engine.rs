// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

use tessera_components::connect_port;
use tessera_components::sink::Sink;
use tessera_components::source::Source;
use tessera_engine::run_simulation;
use tessera_engine::test_helpers::start_test;

#[test]
fn all_spawned() {
    let mut engine = start_test(file!());

    let source: Source<i32> = Source::new(engine.top(), "source", None);
    let sink = Sink::new(engine.top(), "sink");

    source.connect_port_tx(sink.port_rx());
    engine.spawn(async move { source.run().await });
    engine.spawn(async move { sink.run().await });
    engine.run().unwrap();
}

#[test]
fn all_registered() {
    let mut engine = start_test(file!());

    let top = engine.top().clone();
    let source = Source::new_and_register(
        &engine,
        &top,
        "source",
        Some(Box::new((0..10).map(|_| 1))),
    );
    let sink = Sink::new_and_register(&engine, &top, "sink");

    connect_port!(source, tx => sink, rx);
    run_simulation!(engine);

    assert_eq!(sink.num_sunk(), 10);
}
