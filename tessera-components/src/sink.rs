// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Sink components.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_engine::engine::Engine;
use tessera_engine::port::{InPort, PortState};
use tessera_engine::traits::{Runnable, SimObject};
use tessera_engine::types::SimResult;
use tessera_model_builder::EntityDisplay;
use tessera_track::enter;
use tessera_track::entity::Entity;

use crate::{port_rx, take_option};

struct SinkState<T>
where
    T: SimObject,
{
    sunk_count: RefCell<usize>,
    rx: RefCell<Option<InPort<T>>>,
}

#[derive(Clone, EntityDisplay)]
pub struct Sink<T>
where
    T: SimObject,
{
    pub entity: Arc<Entity>,
    state: Rc<SinkState<T>>,
}

impl<T> Sink<T>
where
    T: SimObject,
{
    pub fn new(parent: &Arc<Entity>, name: &str) -> Self {
        let entity = Arc::new(Entity::new(parent, name));
        let rx = InPort::new(entity.clone());
        Self {
            entity,
            state: Rc::new(SinkState {
                sunk_count: RefCell::new(0),
                rx: RefCell::new(Some(rx)),
            }),
        }
    }

    #[must_use]
    pub fn new_and_register(engine: &Engine, parent: &Arc<Entity>, name: &str) -> Rc<Self> {
        let rc_self = Rc::new(Self::new(parent, name));
        engine.register(rc_self.clone());
        rc_self
    }

    #[must_use]
    pub fn port_rx(&self) -> Rc<PortState<T>> {
        port_rx!(self.state.rx, state)
    }

    #[must_use]
    pub fn num_sunk(&self) -> usize {
        *self.state.sunk_count.borrow()
    }

    pub async fn run(&self) -> SimResult {
        let rx = take_option!(self.state.rx);
        loop {
            let value = rx.get().await;
            enter!(self.entity ; value.tag());
            *self.state.sunk_count.borrow_mut() += 1;
        }
    }
}

#[async_trait(?Send)]
impl<T> Runnable for Sink<T>
where
    T: SimObject,
{
    async fn run(&self) -> SimResult {
        Sink::run(self).await
    }
}
