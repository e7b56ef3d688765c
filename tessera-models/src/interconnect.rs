// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! The interconnect between tiles.
//!
//! A deliberately simple crossbar abstraction: every tile's `tx` feeds a
//! round-robin [`Arbiter`], the winner is routed by destination id, and a
//! fixed per-hop [`Delay`] models the transit latency before the message
//! lands in the destination tile's `rx`. A [`Store`] in front of each
//! tile absorbs bursts while the tile's bounded ingress queues drain, so
//! the delay's output never stalls. Flit counts on the messages feed the
//! traffic statistics; they do not throttle this network.
//!
//! # Ports
//!
//! This component has `N` ingress and `N` egress ports:
//!  - N [input ports](tessera_engine::port::InPort): `rx[i]`
//!  - N [output ports](tessera_engine::port::OutPort): `tx[i]`

use std::rc::Rc;
use std::sync::Arc;

use tessera_components::arbiter::{Arbiter, RoundRobinPolicy};
use tessera_components::delay::Delay;
use tessera_components::router::{DefaultRouter, Router};
use tessera_components::store::Store;
use tessera_engine::engine::Engine;
use tessera_engine::executor::Spawner;
use tessera_engine::port::PortState;
use tessera_engine::time::clock::Clock;
use tessera_model_builder::EntityDisplay;
use tessera_track::entity::Entity;

use crate::coherence::messages::NetMsg;

#[derive(Clone, EntityDisplay)]
pub struct Interconnect {
    pub entity: Arc<Entity>,
    arbiter: Rc<Arbiter<NetMsg>>,
    stores: Vec<Rc<Store<NetMsg>>>,
}

impl Interconnect {
    /// Build and register the arbiter, router, per-tile delays and egress
    /// buffers.
    pub fn new_and_register(
        engine: &Engine,
        parent: &Arc<Entity>,
        name: &str,
        clock: Clock,
        spawner: Spawner,
        num_tiles: usize,
        delay_ticks: usize,
        buffer_capacity: usize,
    ) -> Rc<Self> {
        let entity = Arc::new(Entity::new(parent, name));
        let arbiter = Arbiter::new_and_register(
            engine,
            &entity,
            "arbiter",
            spawner.clone(),
            num_tiles,
            Box::new(RoundRobinPolicy::new()),
        );
        let router =
            Router::new_and_register(engine, &entity, "router", num_tiles, Box::new(DefaultRouter {}));
        arbiter.connect_port_tx(router.port_rx());
        let mut stores = Vec::with_capacity(num_tiles);
        for i in 0..num_tiles {
            let delay = Delay::new_and_register(
                engine,
                &entity,
                &format!("delay{i}"),
                clock.clone(),
                spawner.clone(),
                delay_ticks,
            );
            router.connect_port_tx_i(i, delay.port_rx());
            let store = Store::new_and_register(
                engine,
                &entity,
                &format!("buffer{i}"),
                spawner.clone(),
                buffer_capacity,
            );
            delay.connect_port_tx(store.port_rx());
            stores.push(store);
        }
        Rc::new(Self {
            entity,
            arbiter,
            stores,
        })
    }

    pub fn port_rx_i(&self, i: usize) -> Rc<PortState<NetMsg>> {
        self.arbiter.port_rx_i(i)
    }

    pub fn connect_port_tx_i(&self, i: usize, port_state: Rc<PortState<NetMsg>>) {
        self.stores[i].connect_port_tx(port_state);
    }
}
