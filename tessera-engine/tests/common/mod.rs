// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Shared helpers for the event integration tests.

use tessera_engine::engine::Engine;
use tessera_engine::events::once::Once;
use tessera_engine::types::Eventable;

/// Create a [Once] event that is notified with `value` after `delay` ticks of
/// the default clock.
pub fn create_once_event_at_delay<T>(engine: &mut Engine, delay: u64, value: T) -> Eventable<T>
where
    T: Copy + 'static,
{
    let clock = engine.default_clock();
    let once = Once::new(value);
    let event = once.clone();
    engine.spawn(async move {
        clock.wait_ticks(delay).await;
        once.notify()?;
        Ok(())
    });
    Box::new(event)
}

/// Spawn a background task that keeps the simulation ticking so that
/// `run_until` has activity to run past the event being waited on.
pub fn spawn_activity(engine: &mut Engine) {
    let clock = engine.default_clock();
    engine.spawn(async move {
        loop {
            clock.wait_ticks_or_exit(1).await;
        }
    });
}
