// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use regex::Regex;

use crate::Tag;
use crate::tracker::{EntityManager, Track};

/// A [`Track`] event.
#[derive(Debug, Clone)]
pub struct EventCommon {
    /// The [`Tag`](crate::Tag) of the event originator.
    tag: Tag,

    /// The time at which the event occurred.
    time: f64,

    /// Any event-specific state.
    event: Event,
}

impl EventCommon {
    fn new(tag: Tag, time: f64, event: Event) -> Self {
        Self { tag, time, event }
    }

    /// The time at which the event occurred.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }
}

#[derive(Debug, Clone)]
enum Event {
    Create { num_bytes: usize, req_type: i8 },
    Destroy,
    Log { level: log::Level, text: String },
    Enter { entered: Tag },
    Exit { exited: Tag },
}

struct TrackedState {
    events: Vec<EventCommon>,
    name_to_tag: HashMap<String, Tag>,
}

const INITIAL_CAPACITY: usize = 10000;

impl TrackedState {
    fn new() -> Self {
        Self {
            events: Vec::with_capacity(INITIAL_CAPACITY),
            name_to_tag: HashMap::with_capacity(INITIAL_CAPACITY),
        }
    }

    fn add_event(&mut self, event: EventCommon) {
        self.events.push(event);
    }

    fn add_name_to_tag(&mut self, name: &str, tag: Tag) {
        self.name_to_tag.insert(name.to_owned(), tag);
    }

    fn tag_for_name(&self, name: &str) -> Option<Tag> {
        self.name_to_tag.get(name).copied()
    }

    fn count_ingress(&self, tag: Tag) -> usize {
        self.events
            .iter()
            .filter(|e| e.tag == tag)
            .filter(|e| matches!(e.event, Event::Enter { entered: _ }))
            .count()
    }

    fn count_egress(&self, tag: Tag) -> usize {
        self.events
            .iter()
            .filter(|e| e.tag == tag)
            .filter(|e| matches!(e.event, Event::Exit { exited: _ }))
            .count()
    }

    fn log_lines(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match &e.event {
                Event::Log { level: _, text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

/// A tracker that records all events in memory so that tests can query them
/// after the simulation has finished.
pub struct InMemoryTracker {
    entity_manager: Arc<EntityManager>,
    state: Mutex<TrackedState>,
}

impl InMemoryTracker {
    /// Create a new [`InMemoryTracker`] with an [`EntityManager`].
    pub fn new(entity_manager: Arc<EntityManager>) -> Self {
        Self {
            entity_manager,
            state: Mutex::new(TrackedState::new()),
        }
    }

    fn add_event(&self, event: EventCommon) {
        let mut state_guard = self.state.lock().unwrap();
        state_guard.add_event(event);
    }

    fn time(&self) -> f64 {
        self.entity_manager.time()
    }

    /// Get the [`Tag`] for the specified simulation entity/object.
    pub fn tag_for_name(&self, name: &str) -> Option<Tag> {
        let state_guard = self.state.lock().unwrap();
        state_guard.tag_for_name(name)
    }

    /// Return the number of objects that exited the entity specified by `tag`.
    pub fn count_egress(&self, tag: Tag) -> usize {
        let state_guard = self.state.lock().unwrap();
        state_guard.count_egress(tag)
    }

    /// Return the number of objects that entered the entity specified by `tag`.
    pub fn count_ingress(&self, tag: Tag) -> usize {
        let state_guard = self.state.lock().unwrap();
        state_guard.count_ingress(tag)
    }

    /// Return all recorded log lines.
    pub fn log_lines(&self) -> Vec<String> {
        let state_guard = self.state.lock().unwrap();
        state_guard.log_lines()
    }

    /// Return the number of recorded log lines matching the given pattern.
    pub fn count_logs_matching(&self, pattern: &str) -> usize {
        let re = Regex::new(pattern).unwrap();
        let state_guard = self.state.lock().unwrap();
        state_guard
            .log_lines()
            .iter()
            .filter(|l| re.is_match(l))
            .count()
    }
}

/// Implementation for each [`Track`] event
impl Track for InMemoryTracker {
    fn unique_tag(&self) -> Tag {
        self.entity_manager.unique_tag()
    }

    fn is_entity_enabled(&self, tag: Tag, level: log::Level) -> bool {
        self.entity_manager.is_enabled(tag, level)
    }

    fn add_entity(&self, tag: Tag, entity_name: &str) {
        self.entity_manager.add_entity(tag, entity_name);
        let mut state_guard = self.state.lock().unwrap();
        state_guard.add_name_to_tag(entity_name, tag);
    }

    fn enter(&self, tag: Tag, object: Tag) {
        let time = self.time();
        let enter = Event::Enter { entered: object };
        self.add_event(EventCommon::new(tag, time, enter));
    }

    fn exit(&self, tag: Tag, object: Tag) {
        let time = self.time();
        let exit = Event::Exit { exited: object };
        self.add_event(EventCommon::new(tag, time, exit));
    }

    fn create(&self, _created_by: Tag, tag: Tag, num_bytes: usize, req_type: i8, name: &str) {
        let time = self.time();
        let create = Event::Create {
            num_bytes,
            req_type,
        };
        let mut state_guard = self.state.lock().unwrap();
        state_guard.add_event(EventCommon::new(tag, time, create));
        state_guard.add_name_to_tag(name, tag);
    }

    fn destroy(&self, _destroyed_by: Tag, tag: Tag) {
        let time = self.time();
        self.add_event(EventCommon::new(tag, time, Event::Destroy));
    }

    fn connect(&self, _from: Tag, _to: Tag) {}

    fn log(&self, tag: Tag, level: log::Level, msg: std::fmt::Arguments) {
        let time = self.time();
        let log = Event::Log {
            level,
            text: format!("{msg}"),
        };
        self.add_event(EventCommon::new(tag, time, log));
    }

    fn time(&self, _set_by: Tag, time_ns: f64) {
        self.entity_manager.set_time(time_ns);
    }

    fn shutdown(&self) {
        // Do nothing
    }
}
