//! Recorded-session replay
//!
//! A replay script is JSON Lines. Each line is one step of a visit, with an
//! optional `at_ms` timestamp relative to the start of the visit:
//!
//! ```json
//! {"at_ms": 0, "action": "load", "path": "/", "document_height": 1800}
//! {"at_ms": 40, "action": "scroll", "percent": 60}
//! {"at_ms": 90, "action": "click", "element": "hero-get-started"}
//! {"action": "fill", "form": "contact_form", "fields": {"name": "Alice"}}
//! {"action": "submit", "form": "contact_form"}
//! ```
//!
//! Steps without `at_ms` happen at the previous step's time. Frames are
//! produced by an [`IntervalClock`] at the configured rate, so scrolls that
//! land inside one frame interval are coalesced the way a browser would.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use pagetrail_core::frame::{FrameClock, IntervalClock};
use pagetrail_core::{Page, PageEvent, Pipeline, Properties, SimulatedPage};
use serde::Deserialize;

/// One line of a replay script
#[derive(Debug, Deserialize)]
pub struct ScriptLine {
    #[serde(default)]
    pub at_ms: Option<u64>,
    #[serde(flatten)]
    pub step: Step,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Initial page load. Starts the session.
    Load {
        path: String,
        #[serde(default)]
        referrer: Option<String>,
        #[serde(default)]
        document_height: Option<f64>,
        #[serde(default)]
        viewport_height: Option<f64>,
    },
    /// Client-side route change
    Navigate {
        path: String,
        #[serde(default)]
        document_height: Option<f64>,
    },
    /// Add or relabel an interactive element
    Element { id: String, text: String },
    /// Remove an interactive element
    RemoveElement { id: String },
    /// Scroll to a percentage of the scrollable height
    Scroll { percent: f64 },
    /// Scroll to an absolute offset in pixels
    ScrollTo { top: f64 },
    /// Force a rendering frame now
    Frame,
    Click { element: String },
    Fill {
        form: String,
        fields: BTreeMap<String, String>,
    },
    Submit { form: String },
    Identify {
        user_id: String,
        #[serde(default)]
        properties: Properties,
    },
    Unload,
}

/// Parse a script file
pub fn load_script(path: &Path) -> Result<Vec<ScriptLine>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    parse_script(&content)
}

/// Parse script text. Blank lines and lines starting with `#` are skipped.
pub fn parse_script(content: &str) -> Result<Vec<ScriptLine>> {
    let mut lines = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }
        let line: ScriptLine = serde_json::from_str(raw)
            .with_context(|| format!("invalid step on line {}", idx + 1))?;
        lines.push(line);
    }
    Ok(lines)
}

/// What happened during a replay
#[derive(Debug, Default)]
pub struct ReplaySummary {
    pub steps: usize,
    pub active: bool,
    pub page_views: u64,
    pub scroll_requests: u64,
    pub frames_run: u64,
}

/// Drives a [`Pipeline`] through a script against a simulated page.
pub struct Replayer {
    pipeline: Pipeline,
    origin: String,
    page: SimulatedPage,
    clock: IntervalClock,
    token: String,
    started: bool,
    active: bool,
    unloaded: bool,
    now: Duration,
}

impl Replayer {
    pub fn new(pipeline: Pipeline, origin: &str, frame_rate_hz: u32, token: String) -> Self {
        Self {
            pipeline,
            origin: origin.to_string(),
            page: SimulatedPage::new(origin, "/"),
            clock: IntervalClock::new(frame_rate_hz),
            token,
            started: false,
            active: false,
            unloaded: false,
            now: Duration::ZERO,
        }
    }

    /// Run every step, then deliver the last frame, unload and shut down.
    pub fn run(mut self, script: Vec<ScriptLine>) -> Result<ReplaySummary> {
        let steps = script.len();
        for line in script {
            if let Some(at_ms) = line.at_ms {
                let at = Duration::from_millis(at_ms);
                if at < self.now {
                    bail!("step at {}ms goes back in time", at_ms);
                }
                self.now = at;
            }
            if self.clock.tick(self.now) {
                self.dispatch(PageEvent::Frame);
            }
            self.apply(line.step);
        }

        self.ensure_started();
        self.dispatch(PageEvent::Frame);
        if !self.unloaded {
            self.dispatch(PageEvent::Unload);
        }

        let stats = self.pipeline.frame_stats();
        let summary = ReplaySummary {
            steps,
            active: self.active,
            page_views: self.pipeline.page_views().views(),
            scroll_requests: stats.requests,
            frames_run: stats.frames_run,
        };
        self.pipeline.shutdown();
        Ok(summary)
    }

    fn apply(&mut self, step: Step) {
        match step {
            Step::Load {
                path,
                referrer,
                document_height,
                viewport_height,
            } => {
                let mut page = SimulatedPage::new(self.origin.as_str(), path);
                if let Some(referrer) = referrer {
                    page = page.with_referrer(referrer);
                }
                let metrics = page_geometry(&self.page);
                page.set_geometry(
                    document_height.unwrap_or(metrics.0),
                    viewport_height.unwrap_or(metrics.1),
                );
                self.carry_elements(&mut page);
                self.page = page;
                if self.started {
                    self.dispatch(PageEvent::Navigate);
                } else {
                    self.ensure_started();
                }
            }
            Step::Navigate {
                path,
                document_height,
            } => {
                self.ensure_started();
                self.page.navigate(&path);
                if let Some(height) = document_height {
                    let (_, viewport) = page_geometry(&self.page);
                    self.page.set_geometry(height, viewport);
                }
                self.dispatch(PageEvent::Navigate);
            }
            Step::Element { id, text } => self.page.set_element(id, text),
            Step::RemoveElement { id } => self.page.remove_element(&id),
            Step::Scroll { percent } => {
                self.ensure_started();
                self.page.scroll_to_percent(percent);
                self.dispatch(PageEvent::Scroll);
            }
            Step::ScrollTo { top } => {
                self.ensure_started();
                self.page.scroll_to(top);
                self.dispatch(PageEvent::Scroll);
            }
            Step::Frame => {
                self.ensure_started();
                self.dispatch(PageEvent::Frame);
            }
            Step::Click { element } => {
                self.ensure_started();
                self.dispatch(PageEvent::Activate { element });
            }
            Step::Fill { form, fields } => self.page.fill_form(form, fields),
            Step::Submit { form } => {
                self.ensure_started();
                self.dispatch(PageEvent::Submit { form_id: form });
            }
            Step::Identify {
                user_id,
                properties,
            } => {
                self.ensure_started();
                self.pipeline
                    .analytics_mut()
                    .identify(&user_id, &properties);
            }
            Step::Unload => {
                self.ensure_started();
                self.dispatch(PageEvent::Unload);
                self.unloaded = true;
            }
        }
    }

    fn ensure_started(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.active = self.pipeline.start(&self.token, &mut self.page);
    }

    fn dispatch(&mut self, event: PageEvent) {
        self.pipeline.dispatch(&event, &mut self.page);
    }

    /// Elements declared before `load` belong to the loaded page too
    fn carry_elements(&self, page: &mut SimulatedPage) {
        for id in self.page.interactive_elements() {
            if let Some(text) = self.page.element_text(&id) {
                page.set_element(id, text);
            }
        }
    }
}

fn page_geometry(page: &SimulatedPage) -> (f64, f64) {
    let metrics = page.scroll_metrics();
    (metrics.document_height, metrics.viewport_height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagetrail_core::tagger::InteractionTagger;
    use pagetrail_core::{Analytics, MemorySink, ThresholdSet, BUTTON_CLICKED, SCROLL_DEPTH};

    fn replay(script: &str) -> (MemorySink, ReplaySummary) {
        let sink = MemorySink::new();
        let pipeline = Pipeline::new(
            Analytics::new(Box::new(sink.clone())),
            ThresholdSet::default(),
            InteractionTagger::new(Vec::new(), true),
        );
        let summary = Replayer::new(pipeline, "https://example.com", 60, "abc123".to_string())
            .run(parse_script(script).unwrap())
            .unwrap();
        (sink, summary)
    }

    #[test]
    fn test_parse_script_skips_comments() {
        let lines = parse_script(
            "# visit\n\n{\"action\": \"load\", \"path\": \"/\"}\n{\"at_ms\": 5, \"action\": \"frame\"}\n",
        )
        .unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].at_ms, Some(5));
        assert!(matches!(lines[1].step, Step::Frame));
    }

    #[test]
    fn test_parse_script_reports_line() {
        let err = parse_script("{\"action\": \"load\", \"path\": \"/\"}\n{\"action\": \"teleport\"}")
            .err()
            .unwrap();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_scroll_burst_within_one_frame() {
        let (sink, summary) = replay(
            r#"{"at_ms": 0, "action": "load", "path": "/", "document_height": 1800, "viewport_height": 800}
{"at_ms": 1, "action": "scroll", "percent": 10}
{"at_ms": 2, "action": "scroll", "percent": 30}
{"at_ms": 3, "action": "scroll", "percent": 60}
{"at_ms": 20, "action": "frame"}"#,
        );
        let depths: Vec<i64> = sink
            .events_named(SCROLL_DEPTH)
            .iter()
            .filter_map(|e| e.properties["depth"].as_i64())
            .collect();
        assert_eq!(depths, vec![25, 50]);
        assert_eq!(summary.scroll_requests, 3);
        assert_eq!(summary.page_views, 1);
        assert!(summary.active);
    }

    #[test]
    fn test_time_must_not_go_backwards() {
        let sink = MemorySink::new();
        let pipeline = Pipeline::new(
            Analytics::new(Box::new(sink)),
            ThresholdSet::default(),
            InteractionTagger::default(),
        );
        let script = parse_script(
            "{\"at_ms\": 50, \"action\": \"load\", \"path\": \"/\"}\n{\"at_ms\": 10, \"action\": \"frame\"}",
        )
        .unwrap();
        let result =
            Replayer::new(pipeline, "https://example.com", 60, "abc123".to_string()).run(script);
        assert!(result.is_err());
    }

    #[test]
    fn test_elements_declared_before_load_survive() {
        let (sink, _) = replay(
            r#"{"action": "element", "id": "cta", "text": "Buy"}
{"action": "load", "path": "/pricing"}
{"action": "click", "element": "cta"}"#,
        );
        let clicks = sink.events_named(BUTTON_CLICKED);
        assert_eq!(clicks.len(), 1);
        assert_eq!(clicks[0].properties["button_text"].as_str(), Some("Buy"));
        assert_eq!(clicks[0].properties["page"].as_str(), Some("/pricing"));
    }
}
