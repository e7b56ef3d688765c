// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

use std::cell::RefCell;
use std::rc::Rc;

use tessera_components::delay::Delay;
use tessera_components::sink::Sink;
use tessera_components::source::Source;
use tessera_components::store::Store;
use tessera_components::{connect_port, option_box_repeat};
use tessera_engine::port::{InPort, OutPort};
use tessera_engine::test_helpers::start_test;
use tessera_engine::{run_simulation, spawn_simulation};

#[test]
fn values_cross_the_delay() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let spawner = engine.spawner.clone();

    const LAG: usize = 20;
    const NUM_PUTS: i32 = 100;

    let delay = Delay::new(engine.top(), "delay", clock.clone(), spawner.clone(), LAG);
    let buffer = Store::new(engine.top(), "buffer", spawner, 1);

    connect_port!(delay, tx => buffer, rx);
    spawn_simulation!(engine; [delay, buffer]);

    let mut tx = OutPort::new(engine.top().clone(), "tb_tx");
    tx.connect(delay.port_rx());
    engine.spawn(async move {
        for _ in 0..NUM_PUTS {
            tx.put(1).await?;
        }
        Ok(())
    });

    let rx = InPort::new(engine.top().clone());
    buffer.connect_port_tx(rx.state());
    let received = Rc::new(RefCell::new(0));
    {
        let received = received.clone();
        engine.spawn(async move {
            for _ in 0..NUM_PUTS {
                *received.borrow_mut() += rx.get().await;
            }
            Ok(())
        });
    }

    engine.run().unwrap();
    assert_eq!(*received.borrow(), NUM_PUTS);
    // The first value cannot land before the configured lag has elapsed.
    assert!(clock.tick_now().tick() >= LAG as u64);
}

#[test]
fn pipeline_throughput() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let spawner = engine.spawner.clone();

    const LAG: usize = 3;
    const NUM_PUTS: usize = LAG * 10;

    let source = Source::new(engine.top(), "source", option_box_repeat!(500 ; NUM_PUTS));
    let delay = Delay::new(engine.top(), "delay", clock, spawner, LAG);
    let sink = Sink::new(engine.top(), "sink");

    connect_port!(source, tx => delay, rx);
    connect_port!(delay, tx => sink, rx);

    run_simulation!(engine; [source, delay, sink]);

    assert_eq!(sink.num_sunk(), NUM_PUTS);
}

#[test]
#[should_panic(expected = "Delay output stalled")]
fn stalled_output_is_fatal() {
    // A delay line cannot hold a value back; a full downstream buffer with
    // a slow consumer must trip the stall assertion.
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let spawner = engine.spawner.clone();

    const NUM_PUTS: usize = 10;

    let source = Source::new(engine.top(), "source", option_box_repeat!(500 ; NUM_PUTS));
    let delay = Delay::new(engine.top(), "delay", clock.clone(), spawner.clone(), 1);
    let store = Store::new(engine.top(), "store", spawner, 1);

    connect_port!(source, tx => delay, rx);
    connect_port!(delay, tx => store, rx);

    spawn_simulation!(engine; [source, store, delay]);

    let rx = InPort::new(engine.top().clone());
    store.connect_port_tx(rx.state());
    engine.spawn(async move {
        loop {
            let _ = rx.get().await;
            clock.wait_ticks(10).await;
        }
    });
    run_simulation!(engine);
}

#[test]
#[should_panic(expected = "top::delay: tx not connected")]
fn disconnected_delay() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let spawner = engine.spawner.clone();

    let source = Source::new(engine.top(), "source", option_box_repeat!(500 ; 10));
    let delay = Delay::new(engine.top(), "delay", clock, spawner, 1);

    connect_port!(source, tx => delay, rx);

    run_simulation!(engine; [source, delay]);
}
