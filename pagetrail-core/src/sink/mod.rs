//! Event sinks
//!
//! A sink is the backend that stores tracked events. The pipeline only ever
//! talks to it through [`EventSink`], so any analytics backend that can
//! accept `init`/`identify`/`track`/`register_default_properties` fits.
//!
//! ## Built-in sinks
//!
//! - [`HttpSink`]: posts JSON batches to a collector over HTTP. Delivery is
//!   fire-and-forget: calls enqueue and return, a background worker sends.
//! - [`MemorySink`]: records everything in memory. Used for dry runs and tests.
//!
//! ## Default properties
//!
//! Properties registered through [`EventSink::register_default_properties`]
//! are attached by the sink to every later event. Event properties win on
//! key collisions.

mod http;
mod memory;
pub mod wire;

pub use http::{DeliveryStats, HttpSink};
pub use memory::{MemorySink, RecordedIdentity};

use crate::config::{AnalyticsConfig, Persistence};
use crate::error::Result;
use crate::types::{Properties, TrackedEvent};

/// Options passed to [`EventSink::init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkOptions {
    /// Where the anonymous visitor id lives between runs
    pub persistence: Persistence,
    /// Log every event as it is tracked
    pub debug: bool,
    /// Whether generic interactions are captured automatically
    pub autocapture: bool,
}

impl From<&AnalyticsConfig> for SinkOptions {
    fn from(config: &AnalyticsConfig) -> Self {
        Self {
            persistence: config.persistence,
            debug: config.debug,
            autocapture: config.autocapture,
        }
    }
}

/// Contract every analytics backend satisfies.
///
/// Methods are synchronous and must not block on delivery. Errors are
/// reported to the facade, which logs and swallows them.
pub trait EventSink: Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Prepare the sink for `token`. Called once per session.
    fn init(&mut self, token: &str, options: &SinkOptions) -> Result<()>;

    /// Register properties attached to every subsequent event
    fn register_default_properties(&mut self, properties: Properties) -> Result<()>;

    /// Associate subsequent events with `user_id`
    fn identify(&mut self, user_id: &str, properties: &Properties) -> Result<()>;

    /// Hand one event to the sink
    fn track(&mut self, event: &TrackedEvent) -> Result<()>;

    /// Start pushing out anything buffered without waiting for delivery.
    /// Sinks without buffering do nothing.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Push out anything buffered and wait until it has been attempted.
    /// Only for session end, never for calls made on behalf of the page.
    fn flush_and_wait(&mut self) -> Result<()> {
        self.flush()
    }
}

/// Merge default properties under event properties; event keys win.
pub(crate) fn with_defaults(defaults: &Properties, properties: &Properties) -> Properties {
    let mut merged = defaults.clone();
    merged.extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}
