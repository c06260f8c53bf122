//! Event pipeline
//!
//! The pipeline is the subscription table: it is built once at setup and
//! routes each [`PageEvent`] to the tracker that owns it.
//!
//! | Page event | Handler |
//! |------------|---------|
//! | `Navigate` | cancel pending frame, [`PageViewObserver`], fresh [`ThresholdTracker`], rebind [`InteractionTagger`] |
//! | `Scroll`   | [`FrameGate::request`] (coalesced) |
//! | `Frame`    | [`ThresholdTracker::sample`] on the latest scroll sample |
//! | `Activate` | [`InteractionTagger::activate`] |
//! | `Submit`   | [`Analytics::track_form_submission`], then clear the form |
//! | `Unload`   | cancel pending frame, start a flush without waiting on delivery |
//!
//! Everything runs on the caller's thread in the order events are dispatched,
//! so emitted events keep the order of the interactions that caused them.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Result;
use crate::facade::Analytics;
use crate::frame::{FrameGate, FrameStats};
use crate::page::Page;
use crate::pageview::PageViewObserver;
use crate::scroll::{ThresholdSet, ThresholdTracker};
use crate::sink::EventSink;
use crate::tagger::InteractionTagger;
use crate::types::ScrollMetrics;

/// Something that happened on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageEvent {
    /// The route may have changed (also sent on initial load)
    Navigate,
    /// The scroll position changed
    Scroll,
    /// A rendering frame is about to be drawn
    Frame,
    /// An interactive element was clicked or otherwise activated
    Activate { element: String },
    /// A form was submitted
    Submit { form_id: String },
    /// The page is going away
    Unload,
}

pub struct Pipeline {
    analytics: Analytics,
    thresholds: ThresholdSet,
    scroll: ThresholdTracker,
    gate: FrameGate<ScrollMetrics>,
    page_views: PageViewObserver,
    tagger: InteractionTagger,
}

impl Pipeline {
    pub fn new(analytics: Analytics, thresholds: ThresholdSet, tagger: InteractionTagger) -> Self {
        Self {
            analytics,
            scroll: ThresholdTracker::new(thresholds.clone()),
            thresholds,
            gate: FrameGate::new(),
            page_views: PageViewObserver::new(),
            tagger,
        }
    }

    /// Build the pipeline described by `config` around `sink`
    pub fn from_config(config: &Config, sink: Box<dyn EventSink>) -> Result<Self> {
        config.validate()?;
        let analytics = Analytics::from_config(&config.analytics, sink);
        let tagger = InteractionTagger::from_entries(&config.tags, config.analytics.autocapture);
        Ok(Self::new(analytics, config.analytics.threshold_set()?, tagger))
    }

    /// Initialize analytics and process the initial page load.
    ///
    /// Returns true if a session is active. An inactive pipeline still
    /// accepts events; they just go nowhere.
    pub fn start(&mut self, token: &str, page: &mut dyn Page) -> bool {
        let active = self.analytics.initialize(token, Some(&*page)).is_some();
        self.dispatch(&PageEvent::Navigate, page);
        active
    }

    /// Route one page event.
    pub fn dispatch(&mut self, event: &PageEvent, page: &mut dyn Page) {
        match event {
            PageEvent::Navigate => self.on_navigate(&*page),
            PageEvent::Scroll => {
                self.gate.request(page.scroll_metrics());
            }
            PageEvent::Frame => self.on_frame(&*page),
            PageEvent::Activate { element } => {
                self.tagger.activate(element, &*page, &mut self.analytics);
            }
            PageEvent::Submit { form_id } => {
                self.analytics.track_form_submission(form_id, &*page);
                if !page.clear_form(form_id) {
                    tracing::debug!(form_id = %form_id, "Submitted form not found on page");
                }
            }
            PageEvent::Unload => {
                if self.gate.cancel() {
                    tracing::debug!("Pending scroll frame cancelled by unload");
                }
                self.analytics.flush();
            }
        }
    }

    fn on_navigate(&mut self, page: &dyn Page) {
        if !self.page_views.observe(page, &mut self.analytics) {
            return;
        }
        if self.gate.cancel() {
            tracing::debug!("Pending scroll frame cancelled by navigation");
        }
        self.scroll = ThresholdTracker::new(self.thresholds.clone());
        self.tagger.detach();
        self.tagger.attach(page);
    }

    fn on_frame(&mut self, page: &dyn Page) {
        let Some(metrics) = self.gate.on_frame() else {
            return;
        };
        for depth in self.scroll.sample(&metrics) {
            self.analytics.track_scroll_depth(depth, page);
        }
    }

    pub fn analytics(&self) -> &Analytics {
        &self.analytics
    }

    pub fn analytics_mut(&mut self) -> &mut Analytics {
        &mut self.analytics
    }

    /// Threshold state for the current page view
    pub fn scroll_tracker(&self) -> &ThresholdTracker {
        &self.scroll
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.gate.stats()
    }

    pub fn tagger(&self) -> &InteractionTagger {
        &self.tagger
    }

    pub fn page_views(&self) -> &PageViewObserver {
        &self.page_views
    }

    /// Flush, wait for delivery and end the analytics session
    pub fn shutdown(&mut self) {
        self.gate.cancel();
        self.analytics.shutdown();
    }
}
