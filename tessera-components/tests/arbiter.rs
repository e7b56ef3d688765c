// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

use std::sync::Arc;

use tessera_components::arbiter::{Arbiter, RoundRobinPolicy};
use tessera_components::source::Source;
use tessera_components::store::Store;
use tessera_components::test_helpers::{
    ArbiterInputData, check_grant_counts, round_robin_pipeline,
};
use tessera_components::{connect_port, option_box_repeat};
use tessera_engine::port::InPort;
use tessera_engine::run_simulation;
use tessera_engine::test_helpers::start_test;
use tessera_track::entity::Entity;

#[test]
fn all_inputs_drain() {
    let mut engine = start_test(file!());
    let inputs = vec![
        ArbiterInputData { val: 1, count: 25 },
        ArbiterInputData { val: 2, count: 25 },
        ArbiterInputData { val: 3, count: 25 },
    ];
    let total: usize = inputs.iter().map(|i| i.count).sum();

    let sink = round_robin_pipeline(&mut engine, &inputs);
    engine.run().unwrap();
    assert_eq!(sink.num_sunk(), total);
}

#[test]
fn idle_input_is_skipped() {
    let mut engine = start_test(file!());
    // The middle input never offers anything; the arbiter must not stall
    // on it.
    let inputs = vec![
        ArbiterInputData { val: 1, count: 10 },
        ArbiterInputData { val: 2, count: 0 },
        ArbiterInputData { val: 3, count: 20 },
    ];

    let sink = round_robin_pipeline(&mut engine, &inputs);
    engine.run().unwrap();
    assert_eq!(sink.num_sunk(), 30);
}

#[test]
fn grants_match_offers() {
    let mut engine = start_test(file!());
    let spawner = engine.spawner.clone();

    let inputs = [
        ArbiterInputData { val: 1, count: 10 },
        ArbiterInputData { val: 2, count: 5 },
        ArbiterInputData { val: 3, count: 15 },
    ];
    let total: usize = inputs.iter().map(|i| i.count).sum();

    let arbiter = Arbiter::new(
        engine.top(),
        "arb",
        spawner,
        inputs.len(),
        Box::new(RoundRobinPolicy::new()),
    );
    let mut sources = Vec::new();
    for (i, input) in inputs.iter().enumerate() {
        let source = Source::new(
            engine.top(),
            format!("source_{i}").as_str(),
            option_box_repeat!(input.val; input.count),
        );
        connect_port!(source, tx => arbiter, rx, i);
        sources.push(source);
    }

    // Pull the grants directly so their multiset can be checked.
    let port = InPort::new(Arc::new(Entity::new(engine.top(), "port")));
    arbiter.connect_port_tx(port.state());
    engine.spawn(async move {
        let mut granted = vec![0; total];
        for i in &mut granted {
            *i = port.get().await;
        }

        check_grant_counts(&inputs, granted);
        Ok(())
    });

    run_simulation!(engine; sources, [arbiter]);
}

#[test]
#[should_panic]
fn more_sources_than_ports() {
    let mut engine = start_test(file!());
    let spawner = engine.spawner.clone();

    // Three sources against a two-port arbiter; the third connection has
    // no port to attach to.
    let arbiter = Arbiter::new(
        engine.top(),
        "arb",
        spawner.clone(),
        2,
        Box::new(RoundRobinPolicy::new()),
    );
    let source_a = Source::new(engine.top(), "source_a", option_box_repeat!(1; 10));
    let source_b = Source::new(engine.top(), "source_b", option_box_repeat!(2; 5));
    let source_c = Source::new(engine.top(), "source_c", option_box_repeat!(3; 15));
    let store = Store::new(engine.top(), "store", spawner, 30);

    connect_port!(source_a, tx => arbiter, rx, 0);
    connect_port!(source_b, tx => arbiter, rx, 1);
    connect_port!(source_c, tx => arbiter, rx, 2);
    connect_port!(arbiter, tx => store, rx);

    let mut sources = vec![source_a, source_b, source_c];

    run_simulation!(engine; sources, [arbiter, store]);
}

#[test]
#[should_panic]
fn unconnected_output() {
    let mut engine = start_test(file!());
    let spawner = engine.spawner.clone();

    let arbiter = Arbiter::new(
        engine.top(),
        "arb",
        spawner.clone(),
        2,
        Box::new(RoundRobinPolicy::new()),
    );
    let source_a = Source::new(engine.top(), "source_a", option_box_repeat!(1; 10));
    let source_b = Source::new(engine.top(), "source_b", option_box_repeat!(2; 5));
    let _store: Store<i32> = Store::new(engine.top(), "store", spawner, 15);

    connect_port!(source_a, tx => arbiter, rx, 0);
    connect_port!(source_b, tx => arbiter, rx, 1);

    let mut sources = vec![source_a, source_b];

    run_simulation!(engine; sources, [arbiter]);
}
