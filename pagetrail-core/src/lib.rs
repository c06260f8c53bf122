//! # pagetrail-core
//!
//! Core library for pagetrail - a client-side analytics event pipeline.
//!
//! This library provides:
//! - An analytics facade over a pluggable event sink
//! - Page-view, scroll-depth, interaction and form trackers
//! - Frame-coalesced scroll sampling
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Page events flow through three layers:
//! - **Page:** a [`Page`] implementation reports location, geometry and elements
//! - **Trackers:** [`Pipeline`] routes each [`PageEvent`] to the tracker that owns it
//! - **Sink:** [`Analytics`] enriches, scrubs and forwards events to an [`EventSink`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use pagetrail_core::{Config, PageEvent, Pipeline, SimulatedPage, MemorySink};
//!
//! let config = Config::load().expect("failed to load config");
//! let sink = MemorySink::new();
//! let mut pipeline = Pipeline::from_config(&config, Box::new(sink.clone()))
//!     .expect("invalid config");
//!
//! let mut page = SimulatedPage::new("https://example.com", "/").with_geometry(1800.0, 800.0);
//! pipeline.start(&config.token(), &mut page);
//!
//! page.scroll_to_percent(60.0);
//! pipeline.dispatch(&PageEvent::Scroll, &mut page);
//! pipeline.dispatch(&PageEvent::Frame, &mut page);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use facade::{Analytics, Session};
pub use frame::{FrameClock, FrameGate, IntervalClock};
pub use page::{Page, SimulatedPage};
pub use pipeline::{PageEvent, Pipeline};
pub use scroll::{ThresholdSet, ThresholdTracker};
pub use sink::{EventSink, HttpSink, MemorySink, SinkOptions};
pub use types::*;

// Public modules
pub mod config;
pub mod error;
pub mod facade;
pub mod frame;
pub mod logging;
pub mod page;
pub mod pageview;
pub mod pipeline;
pub mod privacy;
pub mod scroll;
pub mod sink;
pub mod tagger;
pub mod types;
