// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Define the [`Track`] trait and a number of [`Tracker`]s.

/// Include the /dev/null tracker.
pub mod dev_null;
/// Include the in-memory tracker.
pub mod in_memory;
/// Include the text-based tracker.
pub mod text;

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub use dev_null::DevNullTracker;
pub use in_memory::InMemoryTracker;
use regex::Regex;
pub use text::TextTracker;

use crate::{ROOT, Tag, TraceState};

/// This is the interface that is supported by all [`Tracker`]s.
pub trait Track {
    /// Allocate a new global tag
    fn unique_tag(&self) -> Tag;

    /// Determine whether events of the given level are enabled for an entity.
    fn is_entity_enabled(&self, tag: Tag, level: log::Level) -> bool;

    /// Register an entity so that its enables can be resolved from its name.
    fn add_entity(&self, tag: Tag, entity_name: &str);

    /// Track when an object with the given tag arrives.
    fn enter(&self, enter_into: Tag, enter_obj: Tag);

    /// Track when an object with the given tag leaves.
    fn exit(&self, exit_from: Tag, exit_obj: Tag);

    /// Track when an object with the given tag is created.
    fn create(&self, created_by: Tag, created_obj: Tag, num_bytes: usize, req_type: i8, name: &str);

    /// Track when an object with the given tag is destroyed.
    fn destroy(&self, destroyed_by: Tag, destroyed_obj: Tag);

    /// Track a connection between two entities.
    fn connect(&self, connect_from: Tag, connect_to: Tag);

    /// Track a log message of the given level.
    fn log(&self, msg_by: Tag, level: log::Level, msg: std::fmt::Arguments);

    /// Advance the time to the time specified in `ns`.
    fn time(&self, set_by: Tag, time_ns: f64);

    /// Flush any buffered events.
    fn shutdown(&self);
}

/// The type of a [`Tracker`] that is shared across entities.
pub type Tracker = Arc<dyn Track + Send + Sync>;

/// Create a [`Tracker`] that prints all track events to `stdout`.
pub fn stdout_tracker() -> Tracker {
    let entity_manager = EntityManager::new(TraceState::Enabled, log::Level::Warn);
    let stdout_writer = Box::new(io::BufWriter::new(io::stdout()));
    let tracker: Tracker = Arc::new(TextTracker::new(entity_manager, stdout_writer));
    tracker
}

/// Create a [`Tracker`] that suppresses all track events.
pub fn dev_null_tracker() -> Tracker {
    let tracker: Tracker = Arc::new(DevNullTracker {});
    tracker
}

/// The per-entity enable state resolved when the entity is registered.
#[derive(Copy, Clone)]
struct EntityEnables {
    trace_enabled: bool,
    log_level: log::Level,
}

/// The [`EntityManager`] is responsible for determining entity log / trace
/// enable states.
///
/// This is shared by the [`Text`](crate::tracker::text) and
/// [`InMemory`](crate::tracker::in_memory)-based trackers.
///
/// This manager is also used to allocate unique [`Tag`] values.
pub struct EntityManager {
    /// Whether trace events are recorded when no filter matches.
    default_trace_enabled: bool,

    /// Level of _log_ events to output when no filter matches.
    default_log_level: log::Level,

    /// List of regular expressions mapping entity names to trace
    /// enable/disable.
    regex_to_trace_enabled: Vec<(Regex, bool)>,

    /// List of regular expressions mapping entity names to log levels.
    regex_to_log_level: Vec<(Regex, log::Level)>,

    /// Resolved enables for each registered entity.
    enables: Mutex<HashMap<Tag, EntityEnables>>,

    /// Used to assign unique tags.
    unique_tag: AtomicU64,

    /// Keep track of the current time.
    current_time: Mutex<f64>,
}

impl EntityManager {
    /// Constructor with [`TraceState`] and [`log::Level`]
    pub fn new(default_trace_enabled: TraceState, default_log_level: log::Level) -> Self {
        Self {
            default_trace_enabled: default_trace_enabled == TraceState::Enabled,
            default_log_level,
            regex_to_trace_enabled: Vec::new(),
            regex_to_log_level: Vec::new(),
            enables: Mutex::new(HashMap::new()),
            unique_tag: AtomicU64::new(ROOT.0 + 1),
            current_time: Mutex::new(0.0),
        }
    }

    pub(crate) fn unique_tag(&self) -> Tag {
        let tag = self.unique_tag.fetch_add(1, Ordering::SeqCst);
        Tag(tag)
    }

    fn trace_enabled_for(&self, entity_name: &str) -> bool {
        for (regex, enabled) in self.regex_to_trace_enabled.iter() {
            if regex.is_match(entity_name) {
                return *enabled;
            }
        }
        self.default_trace_enabled
    }

    fn log_level_for(&self, entity_name: &str) -> log::Level {
        for (regex, level) in self.regex_to_log_level.iter() {
            if regex.is_match(entity_name) {
                return *level;
            }
        }
        self.default_log_level
    }

    pub(crate) fn add_entity(&self, tag: Tag, entity_name: &str) {
        let enables = EntityEnables {
            trace_enabled: self.trace_enabled_for(entity_name),
            log_level: self.log_level_for(entity_name),
        };
        self.enables.lock().unwrap().insert(tag, enables);
    }

    pub(crate) fn is_enabled(&self, tag: Tag, level: log::Level) -> bool {
        let enables = match self.enables.lock().unwrap().get(&tag) {
            Some(enables) => *enables,
            None => EntityEnables {
                trace_enabled: self.default_trace_enabled,
                log_level: self.default_log_level,
            },
        };
        if level == log::Level::Trace && enables.trace_enabled {
            return true;
        }
        level <= enables.log_level
    }

    /// Add a log filter regular expression.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tessera_track::TraceState;
    /// use tessera_track::tracker::EntityManager;
    /// let mut manager = EntityManager::new(TraceState::Disabled, log::Level::Warn);
    /// manager.add_log_filter(".*arb.*", log::Level::Trace);
    /// ```
    pub fn add_log_filter(&mut self, regex_str: &str, level: crate::log::Level) {
        match Regex::new(regex_str) {
            Ok(regex) => self.regex_to_log_level.push((regex, level)),
            Err(e) => panic!("Failed to parse regex {regex_str}:\n{}\n", e),
        };
    }

    /// Add a filter regular expression for enabling/disabling trace for
    /// matching entities.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tessera_track::TraceState;
    /// use tessera_track::tracker::EntityManager;
    /// let mut manager = EntityManager::new(TraceState::Disabled, log::Level::Warn);
    /// manager.add_trace_filter(".*arb.*", TraceState::Enabled);
    /// ```
    pub fn add_trace_filter(&mut self, regex_str: &str, enabled: TraceState) {
        match Regex::new(regex_str) {
            Ok(regex) => self
                .regex_to_trace_enabled
                .push((regex, enabled == TraceState::Enabled)),
            Err(e) => panic!("Failed to parse regex {regex_str}:\n{}\n", e),
        };
    }

    pub(crate) fn time(&self) -> f64 {
        *self.current_time.lock().unwrap()
    }

    pub(crate) fn set_time(&self, new_time: f64) {
        let mut time_guard = self.current_time.lock().unwrap();
        assert!(new_time >= *time_guard);
        *time_guard = new_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity_paths() -> Vec<&'static str> {
        vec!["top", "top::tile0", "top::tile0::l1", "top::tile0::dir"]
    }

    fn manager_with_entities(
        trace: TraceState,
        level: log::Level,
        filters: impl FnOnce(&mut EntityManager),
    ) -> (EntityManager, Vec<Tag>) {
        let mut manager = EntityManager::new(trace, level);
        filters(&mut manager);
        let tags: Vec<Tag> = entity_paths()
            .iter()
            .map(|p| {
                let tag = manager.unique_tag();
                manager.add_entity(tag, p);
                tag
            })
            .collect();
        (manager, tags)
    }

    #[test]
    fn no_filters() {
        let (manager, tags) =
            manager_with_entities(TraceState::Disabled, log::Level::Error, |_| {});

        for tag in tags {
            assert!(!manager.is_enabled(tag, log::Level::Trace));
            assert!(manager.is_enabled(tag, log::Level::Error));
            assert!(!manager.is_enabled(tag, log::Level::Warn));
        }
    }

    #[test]
    fn filter_trace_tile_enable() {
        let (manager, tags) =
            manager_with_entities(TraceState::Disabled, log::Level::Error, |m| {
                m.add_trace_filter(r".*tile0.*", TraceState::Enabled);
            });

        let expected_enables = [false, true, true, true];

        for (i, tag) in tags.iter().enumerate() {
            assert_eq!(
                manager.is_enabled(*tag, log::Level::Trace),
                expected_enables[i]
            );
        }
    }

    #[test]
    fn filter_trace_l1_disable() {
        let (manager, tags) = manager_with_entities(TraceState::Enabled, log::Level::Error, |m| {
            m.add_trace_filter(r".*l1", TraceState::Disabled);
        });

        let expected_enables = [true, true, false, true];

        for (i, tag) in tags.iter().enumerate() {
            assert_eq!(
                manager.is_enabled(*tag, log::Level::Trace),
                expected_enables[i]
            );
        }
    }

    #[test]
    fn first_filter_wins() {
        let (manager, tags) =
            manager_with_entities(TraceState::Disabled, log::Level::Error, |m| {
                // The first pattern seen should be highest priority
                m.add_log_filter(r".*l1", log::Level::Info);
                m.add_log_filter(r".*tile0.*", log::Level::Trace);
                m.add_log_filter(r"top.*", log::Level::Warn);
            });

        let expected_levels = [
            log::Level::Warn,
            log::Level::Trace,
            log::Level::Info,
            log::Level::Trace,
        ];

        for (i, tag) in tags.iter().enumerate() {
            assert!(manager.is_enabled(*tag, expected_levels[i]));
        }
        assert!(!manager.is_enabled(tags[0], log::Level::Info));
        assert!(!manager.is_enabled(tags[2], log::Level::Debug));
    }

    #[test]
    fn tags() {
        let manager = EntityManager::new(TraceState::Disabled, log::Level::Error);
        for i in 0..10 {
            assert_eq!(manager.unique_tag(), Tag(i + ROOT.0 + 1));
        }
    }
}
