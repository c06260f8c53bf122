//! Analytics facade
//!
//! [`Analytics`] is the one surface the rest of an application calls. It owns
//! the sink and the [`Session`] explicitly. There is no global instance: build
//! one at startup and pass it down.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized ──initialize(token, page)──▶ Active(Session) ──shutdown──▶ Shutdown
//!       │
//!       └── empty token / no page ──▶ Disabled (inert for good)
//! ```
//!
//! No facade method returns an error or panics because of the sink. Every
//! failure is logged and the call becomes a no-op, so the page keeps working
//! with analytics switched off.

use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::{DateTime, Utc};

use crate::config::AnalyticsConfig;
use crate::error::{Error, Result};
use crate::page::Page;
use crate::privacy;
use crate::props;
use crate::sink::{EventSink, SinkOptions};
use crate::types::{
    Properties, PropertyValue, TrackedEvent, FORM_SUBMITTED, PAGE_VIEWED, SCROLL_DEPTH,
};

/// Platform reported in default properties
pub const PLATFORM: &str = "web";

/// A live analytics session: the initialized sink plus what was registered with it.
pub struct Session {
    token: String,
    sink: Box<dyn EventSink>,
    defaults: Properties,
    started_at: DateTime<Utc>,
}

impl Session {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Default properties registered with the sink at initialization
    pub fn defaults(&self) -> &Properties {
        &self.defaults
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("sink", &self.sink.name())
            .field("defaults", &self.defaults)
            .field("started_at", &self.started_at)
            .finish()
    }
}

enum State {
    Uninitialized(Box<dyn EventSink>),
    Disabled,
    Active(Session),
    Shutdown,
}

/// The analytics facade.
pub struct Analytics {
    state: State,
    options: SinkOptions,
    defaults: Properties,
    page_id: Option<String>,
}

impl Analytics {
    /// Wrap a sink. Nothing is sent until [`initialize`](Self::initialize) succeeds.
    pub fn new(sink: Box<dyn EventSink>) -> Self {
        Self {
            state: State::Uninitialized(sink),
            options: SinkOptions::default(),
            defaults: default_properties(env!("CARGO_PKG_VERSION"), "production"),
            page_id: None,
        }
    }

    /// Wrap a sink using options and default properties from configuration
    pub fn from_config(config: &AnalyticsConfig, sink: Box<dyn EventSink>) -> Self {
        Self::new(sink)
            .with_options(SinkOptions::from(config))
            .with_default_properties(default_properties(
                &config.app_version(),
                &config.environment,
            ))
            .with_page_id(config.page_id.clone())
    }

    pub fn with_options(mut self, options: SinkOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the properties registered with the sink on first initialize
    pub fn with_default_properties(mut self, defaults: Properties) -> Self {
        self.defaults = defaults;
        self
    }

    /// Page identifier added to scroll-depth events
    pub fn with_page_id(mut self, page_id: Option<String>) -> Self {
        self.page_id = page_id;
        self
    }

    pub fn options(&self) -> &SinkOptions {
        &self.options
    }

    /// Start the session.
    ///
    /// Returns `None` (and logs) when the token is empty, when there is no
    /// browsing context, or when the sink refuses to initialize. Calling it
    /// again after success returns the existing session without touching the
    /// sink.
    pub fn initialize(&mut self, token: &str, page: Option<&dyn Page>) -> Option<&Session> {
        if self.is_active() {
            return self.session();
        }
        if matches!(self.state, State::Disabled | State::Shutdown) {
            tracing::debug!("Analytics initialize ignored: pipeline is inert");
            return None;
        }

        let token = token.trim();
        let missing = if token.is_empty() {
            Some(Error::ConfigurationMissing("empty token".to_string()))
        } else if page.is_none() {
            Some(Error::ConfigurationMissing("no browsing context".to_string()))
        } else {
            None
        };
        if let Some(e) = missing {
            tracing::warn!(error = %e, "Analytics not initialized; all tracking disabled");
            self.state = State::Disabled;
            return None;
        }

        let mut sink = match std::mem::replace(&mut self.state, State::Shutdown) {
            State::Uninitialized(sink) => sink,
            other => {
                self.state = other;
                return None;
            }
        };

        let options = self.options;
        if let Err(e) = guarded(sink.name(), "init", || sink.init(token, &options)) {
            tracing::warn!(sink = sink.name(), error = %e, "Analytics sink failed to initialize");
            self.state = State::Uninitialized(sink);
            return None;
        }

        let defaults = self.defaults.clone();
        if let Err(e) = guarded(sink.name(), "register_default_properties", || {
            sink.register_default_properties(defaults.clone())
        }) {
            tracing::warn!(sink = sink.name(), error = %e, "Failed to register default properties");
        }

        tracing::info!(
            sink = sink.name(),
            debug = options.debug,
            autocapture = options.autocapture,
            "Analytics initialized"
        );

        self.state = State::Active(Session {
            token: token.to_string(),
            sink,
            defaults,
            started_at: Utc::now(),
        });
        self.session()
    }

    /// The active session, if any
    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            State::Active(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active(_))
    }

    /// Associate later events with `user_id`. No-op when inactive or `user_id` is empty.
    pub fn identify(&mut self, user_id: &str, properties: &Properties) {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            tracing::debug!("identify ignored: empty user id");
            return;
        }
        let Some(session) = self.active_session("identify") else {
            return;
        };

        let mut properties = properties.clone();
        scrub_logged("identify", &mut properties);

        let sink = &mut session.sink;
        if let Err(e) = guarded(sink.name(), "identify", || sink.identify(user_id, &properties)) {
            tracing::warn!(sink = sink.name(), error = %e, "identify failed");
        }
    }

    /// Forward one event to the sink. Never fails.
    pub fn track(&mut self, name: &str, properties: Properties) {
        let Some(session) = self.active_session(name) else {
            return;
        };

        let mut event = match TrackedEvent::new(name, properties) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping event");
                return;
            }
        };
        scrub_logged(&event.name, &mut event.properties);

        let sink = &mut session.sink;
        if let Err(e) = guarded(sink.name(), "track", || sink.track(&event)) {
            tracing::warn!(sink = sink.name(), event = %event.name, error = %e, "track failed");
        }
    }

    /// Emit `"Page Viewed"` enriched with the page's URL, path and referrer.
    pub fn track_page_view(&mut self, page_name: &str, properties: Properties, page: &dyn Page) {
        let location = page.location();
        let mut props = properties;
        props.insert("page_name".to_string(), page_name.into());
        props.insert("url".to_string(), location.href.into());
        props.insert("path".to_string(), location.path.into());
        props.insert(
            "referrer".to_string(),
            page.referrer().unwrap_or_default().into(),
        );
        self.track(PAGE_VIEWED, props);
    }

    /// Emit `"Scroll Depth"` for one threshold.
    pub fn track_scroll_depth(&mut self, depth: u8, page: &dyn Page) {
        let location = page.location();
        let mut props = props! {
            "depth" => depth,
            "url" => location.href,
            "path" => location.path,
        };
        if let Some(page_id) = &self.page_id {
            props.insert("page_id".to_string(), PropertyValue::from(page_id.as_str()));
        }
        self.track(SCROLL_DEPTH, props);
    }

    /// Emit `"Form Submitted"`. Field values are never sent.
    pub fn track_form_submission(&mut self, form_id: &str, page: &dyn Page) {
        let location = page.location();
        self.track(
            FORM_SUBMITTED,
            props! {
                "form_id" => form_id,
                "url" => location.href,
                "path" => location.path,
            },
        );
    }

    /// Ask the sink to deliver anything buffered. Returns without waiting
    /// for delivery.
    pub fn flush(&mut self) {
        self.flush_sink(false);
    }

    /// Deliver anything buffered and wait for the attempt to finish.
    pub fn flush_and_wait(&mut self) {
        self.flush_sink(true);
    }

    fn flush_sink(&mut self, wait: bool) {
        if let State::Active(session) = &mut self.state {
            let sink = &mut session.sink;
            let result = if wait {
                guarded(sink.name(), "flush_and_wait", || sink.flush_and_wait())
            } else {
                guarded(sink.name(), "flush", || sink.flush())
            };
            if let Err(e) = result {
                tracing::warn!(sink = sink.name(), wait, error = %e, "flush failed");
            }
        }
    }

    /// Flush, wait for delivery and end the session. Later calls are no-ops.
    pub fn shutdown(&mut self) {
        self.flush_and_wait();
        if let State::Active(session) = std::mem::replace(&mut self.state, State::Shutdown) {
            tracing::info!(sink = session.sink_name(), "Analytics session ended");
        }
    }

    fn active_session(&mut self, call: &str) -> Option<&mut Session> {
        match &mut self.state {
            State::Active(session) => Some(session),
            State::Uninitialized(_) => {
                tracing::warn!(call, error = %Error::SinkUnavailable, "Analytics call dropped");
                None
            }
            State::Disabled | State::Shutdown => {
                tracing::debug!(call, "Analytics inert; call dropped");
                None
            }
        }
    }
}

/// Default properties registered once per session
pub fn default_properties(app_version: &str, environment: &str) -> Properties {
    props! {
        "app_version" => app_version,
        "platform" => PLATFORM,
        "environment" => environment,
    }
}

/// Run a sink call, turning panics into [`Error::SinkCall`].
fn guarded<F>(sink: &str, call: &str, f: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        Err(Error::SinkCall(format!("{} sink panicked during {}", sink, call)))
    })
}

fn scrub_logged(context: &str, properties: &mut Properties) {
    let dropped = privacy::scrub(properties);
    if !dropped.is_empty() {
        tracing::warn!(
            context,
            dropped = ?dropped,
            "Dropped credential-like properties"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::SimulatedPage;
    use crate::sink::MemorySink;

    fn page() -> SimulatedPage {
        SimulatedPage::new("https://example.com", "/").with_referrer("https://search.test/")
    }

    fn active() -> (Analytics, MemorySink) {
        let sink = MemorySink::new();
        let mut analytics = Analytics::new(Box::new(sink.clone()));
        assert!(analytics.initialize("abc123", Some(&page())).is_some());
        (analytics, sink)
    }

    #[test]
    fn test_initialize_registers_defaults_once() {
        let before = Utc::now();
        let (mut analytics, sink) = active();
        assert!(analytics.initialize("abc123", Some(&page())).is_some());
        let session = analytics.initialize("other", Some(&page())).unwrap();
        assert_eq!(session.token(), "abc123");
        assert!(session.started_at() >= before);
        assert!(session.started_at() <= Utc::now());

        assert_eq!(sink.init_calls(), 1);
        assert_eq!(sink.token().as_deref(), Some("abc123"));
        let defaults = sink.defaults();
        assert_eq!(defaults["platform"].as_str(), Some("web"));
        assert_eq!(defaults["environment"].as_str(), Some("production"));
        assert!(defaults.contains_key("app_version"));
    }

    #[test]
    fn test_empty_token_makes_pipeline_inert() {
        let sink = MemorySink::new();
        let mut analytics = Analytics::new(Box::new(sink.clone()));
        assert!(analytics.initialize("", Some(&page())).is_none());

        analytics.track("Page Viewed", Properties::new());
        analytics.identify("user-1", &Properties::new());
        analytics.track_page_view("Home", Properties::new(), &page());
        assert!(analytics.initialize("abc123", Some(&page())).is_none());
        analytics.track("Page Viewed", Properties::new());

        assert_eq!(sink.init_calls(), 0);
        assert_eq!(sink.dispatch_count(), 0);
    }

    #[test]
    fn test_no_browsing_context_is_inert() {
        let sink = MemorySink::new();
        let mut analytics = Analytics::new(Box::new(sink.clone()));
        assert!(analytics.initialize("abc123", None).is_none());
        analytics.track("Page Viewed", Properties::new());
        assert_eq!(sink.dispatch_count(), 0);
    }

    #[test]
    fn test_track_before_initialize_is_noop() {
        let sink = MemorySink::new();
        let mut analytics = Analytics::new(Box::new(sink.clone()));
        analytics.track("Page Viewed", Properties::new());
        assert_eq!(sink.dispatch_count(), 0);

        // the sink is still available for a later initialize
        assert!(analytics.initialize("abc123", Some(&page())).is_some());
        analytics.track("Page Viewed", Properties::new());
        assert_eq!(sink.dispatch_count(), 1);
    }

    #[test]
    fn test_sink_failures_are_swallowed() {
        let (mut analytics, sink) = active();
        sink.set_failing(true);
        analytics.track("Page Viewed", Properties::new());
        analytics.identify("user-1", &Properties::new());
        analytics.flush();
        assert_eq!(sink.dispatch_count(), 0);

        sink.set_failing(false);
        analytics.track("Page Viewed", Properties::new());
        assert_eq!(sink.dispatch_count(), 1);
    }

    #[test]
    fn test_failed_init_can_be_attempted_again() {
        let sink = MemorySink::new();
        sink.set_failing(true);
        let mut analytics = Analytics::new(Box::new(sink.clone()));
        assert!(analytics.initialize("abc123", Some(&page())).is_none());
        assert!(!analytics.is_active());

        sink.set_failing(false);
        assert!(analytics.initialize("abc123", Some(&page())).is_some());
        assert_eq!(sink.init_calls(), 2);
    }

    #[test]
    fn test_identify_ignores_empty_user() {
        let (mut analytics, sink) = active();
        analytics.identify("", &Properties::new());
        analytics.identify("   ", &Properties::new());
        assert!(sink.identities().is_empty());

        analytics.identify("user-42", &props! { "plan" => "pro" });
        let ids = sink.identities();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].user_id, "user-42");
        assert_eq!(ids[0].properties["plan"].as_str(), Some("pro"));
    }

    #[test]
    fn test_empty_event_name_dropped() {
        let (mut analytics, sink) = active();
        analytics.track("", Properties::new());
        assert_eq!(sink.dispatch_count(), 0);
    }

    #[test]
    fn test_credentials_never_reach_sink() {
        let (mut analytics, sink) = active();
        analytics.track(
            "Signed Up",
            props! { "email_domain" => "example.com", "password" => "hunter22" },
        );
        let event = &sink.events()[0];
        assert!(event.property("password").is_none());
        assert!(event.property("email_domain").is_some());
    }

    #[test]
    fn test_page_view_enrichment() {
        let (mut analytics, sink) = active();
        analytics.track_page_view("Home", props! { "variant" => "b" }, &page());

        let events = sink.events_named(PAGE_VIEWED);
        assert_eq!(events.len(), 1);
        let p = &events[0].properties;
        assert_eq!(p["page_name"].as_str(), Some("Home"));
        assert_eq!(p["url"].as_str(), Some("https://example.com/"));
        assert_eq!(p["path"].as_str(), Some("/"));
        assert_eq!(p["referrer"].as_str(), Some("https://search.test/"));
        assert_eq!(p["variant"].as_str(), Some("b"));
    }

    #[test]
    fn test_scroll_depth_includes_page_id() {
        let sink = MemorySink::new();
        let mut analytics =
            Analytics::new(Box::new(sink.clone())).with_page_id(Some("main-page".to_string()));
        analytics.initialize("abc123", Some(&page()));
        analytics.track_scroll_depth(50, &page());

        let event = &sink.events_named(SCROLL_DEPTH)[0];
        assert_eq!(event.properties["depth"].as_i64(), Some(50));
        assert_eq!(event.properties["page_id"].as_str(), Some("main-page"));
        assert_eq!(event.properties["path"].as_str(), Some("/"));
    }

    #[test]
    fn test_form_submission_omits_field_values() {
        let (mut analytics, sink) = active();
        analytics.track_form_submission("contact_form", &page());

        let event = &sink.events_named(FORM_SUBMITTED)[0];
        assert_eq!(event.properties["form_id"].as_str(), Some("contact_form"));
        assert_eq!(event.properties["url"].as_str(), Some("https://example.com/"));
        assert!(event.property("email").is_none());
    }

    #[test]
    fn test_shutdown_flushes_and_goes_inert() {
        let (mut analytics, sink) = active();
        analytics.flush();
        assert_eq!(sink.waited_flushes(), 0);
        analytics.shutdown();
        assert_eq!(sink.flushes(), 2);
        assert_eq!(sink.waited_flushes(), 1);
        assert!(!analytics.is_active());

        analytics.track("Page Viewed", Properties::new());
        assert_eq!(sink.dispatch_count(), 0);
    }

    struct PanickingSink;

    impl EventSink for PanickingSink {
        fn name(&self) -> &'static str {
            "panicking"
        }
        fn init(&mut self, _token: &str, _options: &SinkOptions) -> Result<()> {
            Ok(())
        }
        fn register_default_properties(&mut self, _properties: Properties) -> Result<()> {
            Ok(())
        }
        fn identify(&mut self, _user_id: &str, _properties: &Properties) -> Result<()> {
            panic!("identify exploded")
        }
        fn track(&mut self, _event: &TrackedEvent) -> Result<()> {
            panic!("track exploded")
        }
    }

    #[test]
    fn test_sink_panics_do_not_escape() {
        let mut analytics = Analytics::new(Box::new(PanickingSink));
        analytics.initialize("abc123", Some(&page()));
        analytics.track("Page Viewed", Properties::new());
        analytics.identify("user-1", &Properties::new());
        assert!(analytics.is_active());
    }
}
