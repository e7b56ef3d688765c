// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Perform arbitration between a number of interfaces.
//!
//! # Ports
//!
//! This component has `N`-input ports and one output:
//!  - N [input ports](tessera_engine::port::InPort): `rx[i]` for `i in [0, N-1]`
//!  - One [output port](tessera_engine::port::OutPort): `tx`

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_engine::engine::Engine;
use tessera_engine::events::once::Once;
use tessera_engine::executor::Spawner;
use tessera_engine::port::{InPort, OutPort, PortState};
use tessera_engine::traits::{Event, Runnable, SimObject};
use tessera_engine::types::SimResult;
use tessera_model_builder::EntityDisplay;
use tessera_track::entity::Entity;
use tessera_track::{enter, exit, trace};

use crate::{connect_tx, take_option};

#[derive(Default)]
struct ArbiterSharedState<T> {
    active: RefCell<Vec<Option<T>>>,
    arbiter_event: RefCell<Option<Once<()>>>,
    waiting_put: Vec<RefCell<Option<Once<()>>>>,
}

impl<T> ArbiterSharedState<T> {
    fn new(capacity: usize) -> Self {
        Self {
            active: RefCell::new((0..capacity).map(|_| None).collect()),
            arbiter_event: RefCell::new(None),
            waiting_put: (0..capacity).map(|_| RefCell::new(None)).collect(),
        }
    }
}

pub trait Arbitrate<T>
where
    T: SimObject,
{
    fn arbitrate(&mut self, entity: &Arc<Entity>, inputs: &mut [Option<T>]) -> Option<(usize, T)>;
}

pub struct RoundRobinPolicy {
    candidate: usize,
}

impl RoundRobinPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self { candidate: 0 }
    }
}

impl Default for RoundRobinPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arbitrate<T> for RoundRobinPolicy
where
    T: SimObject,
{
    fn arbitrate(&mut self, _entity: &Arc<Entity>, inputs: &mut [Option<T>]) -> Option<(usize, T)> {
        let num_inputs = inputs.len();
        for i in 0..num_inputs {
            let index = (i + self.candidate) % num_inputs;
            if let Some(value) = inputs[index].take() {
                self.candidate = (index + 1) % num_inputs;
                return Some((index, value));
            }
        }
        None
    }
}

struct ArbiterState<T>
where
    T: SimObject,
{
    rx: RefCell<Vec<Option<InPort<T>>>>,
    tx: RefCell<Option<OutPort<T>>>,
    policy: RefCell<Option<Box<dyn Arbitrate<T>>>>,
    shared: Rc<ArbiterSharedState<T>>,
}

#[derive(Clone, EntityDisplay)]
pub struct Arbiter<T>
where
    T: SimObject,
{
    pub entity: Arc<Entity>,
    spawner: Spawner,
    state: Rc<ArbiterState<T>>,
}

impl<T> Arbiter<T>
where
    T: SimObject,
{
    pub fn new(
        parent: &Arc<Entity>,
        name: &str,
        spawner: Spawner,
        num_rx: usize,
        policy: Box<dyn Arbitrate<T>>,
    ) -> Self {
        let entity = Arc::new(Entity::new(parent, name));
        let shared = Rc::new(ArbiterSharedState::new(num_rx));
        let rx = (0..num_rx)
            .map(|_| Some(InPort::new(entity.clone())))
            .collect();
        let tx = OutPort::new(entity.clone(), "tx");
        Self {
            entity,
            spawner,
            state: Rc::new(ArbiterState {
                rx: RefCell::new(rx),
                tx: RefCell::new(Some(tx)),
                policy: RefCell::new(Some(policy)),
                shared,
            }),
        }
    }

    #[must_use]
    pub fn new_and_register(
        engine: &Engine,
        parent: &Arc<Entity>,
        name: &str,
        spawner: Spawner,
        num_rx: usize,
        policy: Box<dyn Arbitrate<T>>,
    ) -> Rc<Self> {
        let rc_self = Rc::new(Self::new(parent, name, spawner, num_rx, policy));
        engine.register(rc_self.clone());
        rc_self
    }

    pub fn connect_port_tx(&self, port_state: Rc<PortState<T>>) {
        connect_tx!(self.state.tx, connect ; port_state);
    }

    pub fn port_rx_i(&self, i: usize) -> Rc<PortState<T>> {
        self.state.rx.borrow()[i].as_ref().unwrap().state()
    }

    pub async fn run(&self) -> SimResult {
        // Start running the handlers for each input
        for (i, mut rx) in self.state.rx.borrow_mut().drain(..).enumerate() {
            let entity = self.entity.clone();
            let rx = rx.take().unwrap();
            let shared = self.state.shared.clone();
            self.spawner
                .spawn(async move { run_input(entity, rx, i, shared).await });
        }

        let tx = take_option!(self.state.tx);
        let mut policy = take_option!(self.state.policy);

        loop {
            let wait_event;
            loop {
                let value;
                let wake_event;
                {
                    // Need to hold the guard for the entire arbitration until the wake_event has
                    // been taken
                    let mut active = self.state.shared.active.borrow_mut();
                    let t = policy.arbitrate(&self.entity, &mut active);
                    match t {
                        Some((i, t)) => {
                            trace!(self.entity ; "grant {}: {}", i, t);
                            wake_event = self.state.shared.waiting_put[i].borrow_mut().take();
                            value = t;
                        }
                        None => {
                            wait_event = Once::default();
                            trace!(self.entity ; "arb wait");
                            *self.state.shared.arbiter_event.borrow_mut() =
                                Some(wait_event.clone());
                            break;
                        }
                    }
                }

                if let Some(event) = wake_event {
                    event.notify()?;
                }
                exit!(self.entity ; value.tag());
                tx.put(value).await?;
            }
            wait_event.listen().await;
        }
    }
}

#[async_trait(?Send)]
impl<T> Runnable for Arbiter<T>
where
    T: SimObject,
{
    async fn run(&self) -> SimResult {
        Arbiter::run(self).await
    }
}

async fn run_input<T: SimObject>(
    entity: Arc<Entity>,
    rx: InPort<T>,
    input_idx: usize,
    shared: Rc<ArbiterSharedState<T>>,
) -> SimResult {
    loop {
        let value = rx.get().await;
        enter!(entity ; value.tag());

        // Check if this input needs to wait for the previous value to be handled
        let wait_event = match shared.active.borrow()[input_idx].as_ref() {
            Some(_) => {
                let once = Once::default();
                *shared.waiting_put[input_idx].borrow_mut() = Some(once.clone());
                Some(once)
            }
            None => None,
        };
        if let Some(once) = wait_event {
            once.listen().await;
        }

        // Set the value for this input
        shared.active.borrow_mut()[input_idx] = Some(value);

        // Wake up the arbiter if it has paused on an event
        if let Some(once) = shared.arbiter_event.borrow_mut().take() {
            once.notify().unwrap();
        }
    }
}
