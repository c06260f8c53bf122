//! End-to-end tests for the event pipeline
//!
//! These drive a [`SimulatedPage`] through realistic visits and check what
//! reaches the sink.

use pagetrail_core::config::{Config, TagEntry};
use pagetrail_core::frame::{FrameClock, IntervalClock};
use pagetrail_core::{
    Analytics, MemorySink, PageEvent, Pipeline, SimulatedPage, BUTTON_CLICKED, FORM_SUBMITTED,
    PAGE_VIEWED, SCROLL_DEPTH,
};
use std::time::Duration;

fn site_config() -> Config {
    let mut config = Config::default();
    config.analytics.page_id = Some("landing".to_string());
    config.analytics.autocapture = false;
    config.tags = vec![
        TagEntry {
            element: "hero-get-started".to_string(),
            section: "hero".to_string(),
            action: "scroll_to_features".to_string(),
        },
        TagEntry {
            element: "nav-contact".to_string(),
            section: "nav".to_string(),
            action: "scroll_to_contact".to_string(),
        },
    ];
    config
}

fn landing_page() -> SimulatedPage {
    let mut page = SimulatedPage::new("https://example.com", "/")
        .with_referrer("https://search.example.org/")
        .with_geometry(1800.0, 800.0);
    page.set_element("hero-get-started", "Get Started");
    page.set_element("nav-contact", "Contact");
    page.fill_form(
        "contact_form",
        [
            ("name", "Alice"),
            ("email", "alice@example.com"),
            ("message", "Hello"),
        ],
    );
    page
}

fn started(sink: &MemorySink, page: &mut SimulatedPage) -> Pipeline {
    pagetrail_core::logging::init_test();
    let mut pipeline = Pipeline::from_config(&site_config(), Box::new(sink.clone()))
        .expect("config should be valid");
    assert!(pipeline.start("abc123", page));
    pipeline
}

fn depths(sink: &MemorySink) -> Vec<i64> {
    sink.events_named(SCROLL_DEPTH)
        .iter()
        .filter_map(|e| e.properties["depth"].as_i64())
        .collect()
}

// ============================================
// Page views
// ============================================

#[test]
fn test_initial_page_view_properties() {
    let sink = MemorySink::new();
    let mut page = landing_page();
    let _pipeline = started(&sink, &mut page);

    let views = sink.events_named(PAGE_VIEWED);
    assert_eq!(views.len(), 1);
    let p = &views[0].properties;
    assert_eq!(p["page_name"].as_str(), Some("/"));
    assert_eq!(p["url"].as_str(), Some("https://example.com/"));
    assert_eq!(p["path"].as_str(), Some("/"));
    assert_eq!(p["referrer"].as_str(), Some("https://search.example.org/"));

    // default properties registered at init ride along
    assert_eq!(p["platform"].as_str(), Some("web"));
    assert_eq!(p["environment"].as_str(), Some("production"));
    assert!(p.contains_key("app_version"));
}

#[test]
fn test_navigation_sequence() {
    let sink = MemorySink::new();
    let mut page = landing_page();
    let mut pipeline = started(&sink, &mut page);

    for path in ["/pricing", "/pricing", "/about", "/"] {
        page.navigate(path);
        pipeline.dispatch(&PageEvent::Navigate, &mut page);
    }

    let paths: Vec<String> = sink
        .events_named(PAGE_VIEWED)
        .iter()
        .map(|e| e.properties["path"].to_string())
        .collect();
    assert_eq!(paths, vec!["/", "/pricing", "/about", "/"]);
    assert_eq!(pipeline.page_views().views(), 4);
}

// ============================================
// Scroll depth
// ============================================

#[test]
fn test_scroll_to_sixty_percent_fires_25_and_50() {
    let sink = MemorySink::new();
    let mut page = landing_page();
    let mut pipeline = started(&sink, &mut page);

    page.scroll_to_percent(60.0);
    pipeline.dispatch(&PageEvent::Scroll, &mut page);
    pipeline.dispatch(&PageEvent::Frame, &mut page);

    assert_eq!(depths(&sink), vec![25, 50]);
    for event in sink.events_named(SCROLL_DEPTH) {
        assert_eq!(event.properties["path"].as_str(), Some("/"));
        assert_eq!(event.properties["page_id"].as_str(), Some("landing"));
    }
}

#[test]
fn test_scroll_up_and_down_fires_each_threshold_once() {
    let sink = MemorySink::new();
    let mut page = landing_page();
    let mut pipeline = started(&sink, &mut page);

    for percent in [30.0, 10.0, 55.0, 20.0, 100.0, 0.0, 100.0] {
        page.scroll_to_percent(percent);
        pipeline.dispatch(&PageEvent::Scroll, &mut page);
        pipeline.dispatch(&PageEvent::Frame, &mut page);
    }

    assert_eq!(depths(&sink), vec![25, 50, 75, 90, 100]);
    assert!(pipeline.scroll_tracker().is_exhausted());
}

#[test]
fn test_hundred_scrolls_in_one_frame_compute_once() {
    let sink = MemorySink::new();
    let mut page = landing_page();
    let mut pipeline = started(&sink, &mut page);

    for step in 1..=100 {
        page.scroll_to_percent(step as f64 * 0.8);
        pipeline.dispatch(&PageEvent::Scroll, &mut page);
    }
    pipeline.dispatch(&PageEvent::Frame, &mut page);

    let stats = pipeline.frame_stats();
    assert_eq!(stats.requests, 100);
    assert_eq!(stats.coalesced, 99);
    assert_eq!(stats.frames_run, 1);
    assert_eq!(pipeline.scroll_tracker().samples(), 1);
    // only the latest position (80%) is evaluated
    assert_eq!(depths(&sink), vec![25, 50, 75]);
}

#[test]
fn test_thresholds_reset_per_page_view() {
    let sink = MemorySink::new();
    let mut page = landing_page();
    let mut pipeline = started(&sink, &mut page);

    page.scroll_to_percent(60.0);
    pipeline.dispatch(&PageEvent::Scroll, &mut page);
    pipeline.dispatch(&PageEvent::Frame, &mut page);

    page.navigate("/blog");
    pipeline.dispatch(&PageEvent::Navigate, &mut page);
    page.scroll_to_percent(30.0);
    pipeline.dispatch(&PageEvent::Scroll, &mut page);
    pipeline.dispatch(&PageEvent::Frame, &mut page);

    let fired: Vec<(String, i64)> = sink
        .events_named(SCROLL_DEPTH)
        .iter()
        .map(|e| {
            (
                e.properties["path"].to_string(),
                e.properties["depth"].as_i64().unwrap_or(-1),
            )
        })
        .collect();
    assert_eq!(
        fired,
        vec![
            ("/".to_string(), 25),
            ("/".to_string(), 50),
            ("/blog".to_string(), 25)
        ]
    );
}

#[test]
fn test_short_page_never_fires() {
    let sink = MemorySink::new();
    let mut page = landing_page();
    page.set_geometry(600.0, 800.0);
    let mut pipeline = started(&sink, &mut page);

    page.scroll_to(50.0);
    pipeline.dispatch(&PageEvent::Scroll, &mut page);
    pipeline.dispatch(&PageEvent::Frame, &mut page);

    assert!(depths(&sink).is_empty());
}

#[test]
fn test_interval_clock_drives_frames() {
    let sink = MemorySink::new();
    let mut page = landing_page();
    let mut pipeline = started(&sink, &mut page);
    let mut clock = IntervalClock::new(60);

    // 5 ms apart: several scrolls land inside one ~16.7 ms frame
    for ms in 0..40u64 {
        page.scroll_to_percent(ms as f64 * 2.5);
        pipeline.dispatch(&PageEvent::Scroll, &mut page);
        if clock.tick(Duration::from_millis(ms * 5)) {
            pipeline.dispatch(&PageEvent::Frame, &mut page);
        }
    }
    pipeline.dispatch(&PageEvent::Frame, &mut page);

    let stats = pipeline.frame_stats();
    assert!(stats.frames_run < stats.requests);
    assert_eq!(depths(&sink), vec![25, 50, 75, 90]);
}

// ============================================
// Interactions and forms
// ============================================

#[test]
fn test_tagged_button_click() {
    let sink = MemorySink::new();
    let mut page = landing_page();
    let mut pipeline = started(&sink, &mut page);

    pipeline.dispatch(
        &PageEvent::Activate {
            element: "nav-contact".to_string(),
        },
        &mut page,
    );

    let clicks = sink.events_named(BUTTON_CLICKED);
    assert_eq!(clicks.len(), 1);
    let p = &clicks[0].properties;
    assert_eq!(p["button_text"].as_str(), Some("Contact"));
    assert_eq!(p["section"].as_str(), Some("nav"));
    assert_eq!(p["action"].as_str(), Some("scroll_to_contact"));
    assert_eq!(p["page"].as_str(), Some("/"));
}

#[test]
fn test_contact_form_submission() {
    let sink = MemorySink::new();
    let mut page = landing_page();
    let mut pipeline = started(&sink, &mut page);

    pipeline.dispatch(
        &PageEvent::Submit {
            form_id: "contact_form".to_string(),
        },
        &mut page,
    );

    let submissions = sink.events_named(FORM_SUBMITTED);
    assert_eq!(submissions.len(), 1);
    let p = &submissions[0].properties;
    assert_eq!(p["form_id"].as_str(), Some("contact_form"));
    assert_eq!(p["path"].as_str(), Some("/"));

    // field values never leave the page
    for value in p.values() {
        let text = value.to_string();
        assert!(!text.contains("Alice"));
        assert!(!text.contains("alice@example.com"));
    }

    let form = page.form("contact_form").expect("form exists");
    assert!(form.values().all(String::is_empty));
}

#[test]
fn test_events_arrive_in_interaction_order() {
    let sink = MemorySink::new();
    let mut page = landing_page();
    let mut pipeline = started(&sink, &mut page);

    pipeline.dispatch(
        &PageEvent::Activate {
            element: "hero-get-started".to_string(),
        },
        &mut page,
    );
    page.scroll_to_percent(30.0);
    pipeline.dispatch(&PageEvent::Scroll, &mut page);
    pipeline.dispatch(&PageEvent::Frame, &mut page);
    pipeline.dispatch(
        &PageEvent::Submit {
            form_id: "contact_form".to_string(),
        },
        &mut page,
    );
    pipeline.dispatch(&PageEvent::Unload, &mut page);

    assert_eq!(
        sink.event_names(),
        vec![PAGE_VIEWED, BUTTON_CLICKED, SCROLL_DEPTH, FORM_SUBMITTED]
    );
    assert_eq!(sink.flushes(), 1);
    assert_eq!(sink.waited_flushes(), 0);
}

// ============================================
// Disabled pipeline
// ============================================

#[test]
fn test_empty_token_dispatches_nothing() {
    let sink = MemorySink::new();
    let mut page = landing_page();
    let mut pipeline =
        Pipeline::from_config(&site_config(), Box::new(sink.clone())).expect("valid config");

    assert!(!pipeline.start("", &mut page));

    page.scroll_to_percent(100.0);
    pipeline.dispatch(&PageEvent::Scroll, &mut page);
    pipeline.dispatch(&PageEvent::Frame, &mut page);
    pipeline.dispatch(
        &PageEvent::Activate {
            element: "hero-get-started".to_string(),
        },
        &mut page,
    );
    pipeline.dispatch(
        &PageEvent::Submit {
            form_id: "contact_form".to_string(),
        },
        &mut page,
    );
    pipeline.dispatch(&PageEvent::Unload, &mut page);

    assert_eq!(sink.init_calls(), 0);
    assert_eq!(sink.dispatch_count(), 0);
    assert!(!pipeline.analytics().is_active());
}

#[test]
fn test_failing_sink_does_not_disturb_page() {
    let sink = MemorySink::new();
    let mut page = landing_page();
    let mut pipeline = started(&sink, &mut page);
    sink.set_failing(true);

    pipeline.dispatch(
        &PageEvent::Submit {
            form_id: "contact_form".to_string(),
        },
        &mut page,
    );

    // the form still resets even though delivery failed
    assert!(page
        .form("contact_form")
        .expect("form exists")
        .values()
        .all(String::is_empty));
    assert!(pipeline.analytics().is_active());
}

#[test]
fn test_explicit_analytics_construction() {
    let sink = MemorySink::new();
    let mut page = landing_page();
    let mut analytics = Analytics::new(Box::new(sink.clone()));

    assert!(analytics.initialize("abc123", Some(&page)).is_some());
    analytics.track_page_view("Landing", Default::default(), &page);
    page.navigate("/pricing");
    analytics.track_page_view("Pricing", Default::default(), &page);

    let views = sink.events_named(PAGE_VIEWED);
    assert_eq!(views[1].properties["referrer"].as_str(), Some("https://example.com/"));
    assert_eq!(views[1].properties["page_name"].as_str(), Some("Pricing"));
}
