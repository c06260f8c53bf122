//! In-memory sink
//!
//! Clones share one log, so a test (or the dry-run CLI) can keep a handle
//! while the facade owns the boxed sink.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::types::{Properties, TrackedEvent};

use super::{with_defaults, EventSink, SinkOptions};

/// An `identify` call as the sink saw it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedIdentity {
    pub user_id: String,
    pub properties: Properties,
}

#[derive(Debug, Default)]
struct MemoryLog {
    token: Option<String>,
    options: Option<SinkOptions>,
    init_calls: usize,
    defaults: Properties,
    identities: Vec<RecordedIdentity>,
    events: Vec<TrackedEvent>,
    flushes: usize,
    waited_flushes: usize,
    failing: bool,
}

/// Sink that records calls instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    log: Arc<Mutex<MemoryLog>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, MemoryLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every subsequent call fail with [`Error::SinkCall`]
    pub fn set_failing(&self, failing: bool) {
        self.log().failing = failing;
    }

    /// Tracked events, default properties already merged in
    pub fn events(&self) -> Vec<TrackedEvent> {
        self.log().events.clone()
    }

    /// Names of tracked events, in order
    pub fn event_names(&self) -> Vec<String> {
        self.log().events.iter().map(|e| e.name.clone()).collect()
    }

    /// Tracked events with the given name, in order
    pub fn events_named(&self, name: &str) -> Vec<TrackedEvent> {
        self.log()
            .events
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    pub fn identities(&self) -> Vec<RecordedIdentity> {
        self.log().identities.clone()
    }

    pub fn defaults(&self) -> Properties {
        self.log().defaults.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.log().token.clone()
    }

    pub fn options(&self) -> Option<SinkOptions> {
        self.log().options
    }

    pub fn init_calls(&self) -> usize {
        self.log().init_calls
    }

    /// Every flush, waited or not
    pub fn flushes(&self) -> usize {
        self.log().flushes
    }

    /// Flushes that asked to wait for delivery
    pub fn waited_flushes(&self) -> usize {
        self.log().waited_flushes
    }

    /// Total `track` + `identify` calls that reached the sink
    pub fn dispatch_count(&self) -> usize {
        let log = self.log();
        log.events.len() + log.identities.len()
    }
}

impl EventSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn init(&mut self, token: &str, options: &SinkOptions) -> Result<()> {
        let mut log = self.log();
        log.init_calls += 1;
        if log.failing {
            return Err(Error::SinkCall("memory sink set to fail".to_string()));
        }
        log.token = Some(token.to_string());
        log.options = Some(*options);
        Ok(())
    }

    fn register_default_properties(&mut self, properties: Properties) -> Result<()> {
        let mut log = self.log();
        if log.failing {
            return Err(Error::SinkCall("memory sink set to fail".to_string()));
        }
        log.defaults.extend(properties);
        Ok(())
    }

    fn identify(&mut self, user_id: &str, properties: &Properties) -> Result<()> {
        let mut log = self.log();
        if log.token.is_none() {
            return Err(Error::SinkUnavailable);
        }
        if log.failing {
            return Err(Error::SinkCall("memory sink set to fail".to_string()));
        }
        log.identities.push(RecordedIdentity {
            user_id: user_id.to_string(),
            properties: properties.clone(),
        });
        Ok(())
    }

    fn track(&mut self, event: &TrackedEvent) -> Result<()> {
        let mut log = self.log();
        if log.token.is_none() {
            return Err(Error::SinkUnavailable);
        }
        if log.failing {
            return Err(Error::SinkCall("memory sink set to fail".to_string()));
        }
        if log.options.map(|o| o.debug).unwrap_or(false) {
            tracing::info!(event = %event.name, properties = ?event.properties, "Tracked event");
        }
        let properties = with_defaults(&log.defaults, &event.properties);
        log.events.push(TrackedEvent {
            name: event.name.clone(),
            properties,
            time: event.time,
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.log().flushes += 1;
        Ok(())
    }

    fn flush_and_wait(&mut self) -> Result<()> {
        let mut log = self.log();
        log.flushes += 1;
        log.waited_flushes += 1;
        Ok(())
    }
}
