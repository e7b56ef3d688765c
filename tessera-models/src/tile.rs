// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! One tile of the system: a coherence engine behind network ports.
//!
//! The tile drives its [`MsiEngine`] on both clock edges and pumps the
//! engine's bounded send and receive queues through an `rx`/`tx` port
//! pair. Backpressure from a full ingress queue is absorbed by holding
//! the message and retrying one tick later.
//!
//! # Ports
//!
//! This component has two ports:
//!  - One [input port](tessera_engine::port::InPort): `rx`
//!  - One [output port](tessera_engine::port::OutPort): `tx`

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_components::{connect_tx, port_rx, take_option};
use tessera_engine::engine::Engine;
use tessera_engine::executor::Spawner;
use tessera_engine::port::{InPort, OutPort, PortState};
use tessera_engine::time::clock::Clock;
use tessera_engine::traits::Runnable;
use tessera_engine::types::{SimError, SimResult};
use tessera_model_builder::EntityDisplay;
use tessera_track::entity::Entity;
use tessera_track::tag::Tagged;
use tessera_track::{enter, exit};

use crate::coherence::messages::NetMsg;
use crate::coherence::shuffle::ShufflePolicy;
use crate::coherence::{CoherenceConfig, EngineMetrics, MsiEngine};
use crate::memory_request::MemoryRequest;

struct TileState {
    pub entity: Arc<Entity>,
    clock: Clock,
    engine: RefCell<MsiEngine>,
    rx: RefCell<Option<InPort<NetMsg>>>,
    tx: RefCell<Option<OutPort<NetMsg>>>,
}

#[derive(Clone, EntityDisplay)]
pub struct Tile {
    pub entity: Arc<Entity>,
    spawner: Spawner,
    state: Rc<TileState>,
}

impl Tile {
    pub fn new(
        parent: &Arc<Entity>,
        name: &str,
        clock: Clock,
        spawner: Spawner,
        cfg: CoherenceConfig,
        shuffle: Box<dyn ShufflePolicy>,
    ) -> Result<Self, SimError> {
        let entity = Arc::new(Entity::new(parent, name));
        let engine = MsiEngine::new(&entity, "engine", cfg, shuffle)?;
        Ok(Self {
            entity: entity.clone(),
            spawner,
            state: Rc::new(TileState {
                entity: entity.clone(),
                clock,
                engine: RefCell::new(engine),
                rx: RefCell::new(Some(InPort::new(entity.clone()))),
                tx: RefCell::new(Some(OutPort::new(entity, "tx"))),
            }),
        })
    }

    pub fn new_and_register(
        engine: &Engine,
        parent: &Arc<Entity>,
        name: &str,
        clock: Clock,
        spawner: Spawner,
        cfg: CoherenceConfig,
        shuffle: Box<dyn ShufflePolicy>,
    ) -> Result<Rc<Self>, SimError> {
        let rc_self = Rc::new(Self::new(parent, name, clock, spawner, cfg, shuffle)?);
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    pub fn connect_port_tx(&self, port_state: Rc<PortState<NetMsg>>) {
        connect_tx!(self.state.tx, connect ; port_state);
    }

    pub fn port_rx(&self) -> Rc<PortState<NetMsg>> {
        port_rx!(self.state.rx, state)
    }

    pub fn id(&self) -> u32 {
        self.state.engine.borrow().id()
    }

    /// Submit a core request for arbitration on the next positive edge.
    pub fn request(&self, req: Rc<MemoryRequest>) {
        self.state.engine.borrow_mut().request(req);
    }

    pub fn metrics(&self) -> EngineMetrics {
        self.state.engine.borrow().metrics().clone()
    }

    pub fn quiescent(&self) -> bool {
        self.state.engine.borrow().quiescent()
    }

    /// Run `f` against the tile's engine, for inspection by tests.
    pub fn with_engine<R>(&self, f: impl FnOnce(&MsiEngine) -> R) -> R {
        f(&self.state.engine.borrow())
    }

    pub async fn run(&self) -> SimResult {
        let tx = take_option!(self.state.tx);
        let state = self.state.clone();
        self.spawner.spawn(async move { run_tx(tx, state).await });

        let rx = take_option!(self.state.rx);
        let state = self.state.clone();
        self.spawner.spawn(async move { run_rx(rx, state).await });

        let clock = self.state.clock.clone();
        loop {
            let now = clock.tick_now().tick();
            self.state.engine.borrow_mut().tick_positive_edge(now);
            clock.wait_phase(1).await;
            self.state.engine.borrow_mut().tick_negative_edge(now);
            clock.next_tick_and_phase_or_exit(0).await;
        }
    }
}

#[async_trait(?Send)]
impl Runnable for Tile {
    async fn run(&self) -> SimResult {
        Tile::run(self).await
    }
}

async fn run_tx(tx: OutPort<NetMsg>, state: Rc<TileState>) -> SimResult {
    loop {
        let next = state.engine.borrow_mut().take_outgoing();
        match next {
            Some(msg) => {
                exit!(state.entity ; msg.tag());
                tx.put(msg).await?;
            }
            None => state.clock.wait_ticks_or_exit(1).await,
        }
    }
}

async fn run_rx(rx: InPort<NetMsg>, state: Rc<TileState>) -> SimResult {
    loop {
        let msg = rx.get().await;
        enter!(state.entity ; msg.tag());
        // Hold the message across ticks until the ingress queue has room.
        while !state.engine.borrow_mut().deliver(msg.clone()) {
            state.clock.wait_ticks_or_exit(1).await;
        }
    }
}
