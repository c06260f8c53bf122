//! Core domain types for pagetrail
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Event** | A named interaction plus scalar properties, on its way to a sink |
//! | **Sink** | The backend that stores events (HTTP collector, in-memory recorder) |
//! | **Default properties** | Key/value pairs a sink attaches to every event once registered |
//! | **Threshold** | A scroll-depth percentage reported at most once per page view |
//! | **Tag** | `(section, action)` metadata bound to an interactive element |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

// ============================================
// Event catalog
// ============================================

/// Emitted once per distinct navigation.
pub const PAGE_VIEWED: &str = "Page Viewed";
/// Emitted once per scroll threshold per page view.
pub const SCROLL_DEPTH: &str = "Scroll Depth";
/// Emitted when a tagged element is activated.
pub const BUTTON_CLICKED: &str = "Button Clicked";
/// Emitted when a form is submitted.
pub const FORM_SUBMITTED: &str = "Form Submitted";

// ============================================
// Properties
// ============================================

/// A scalar property value.
///
/// Events only carry flat scalars; nested objects are not part of the
/// event contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl PropertyValue {
    /// Returns the string payload, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is an integer value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Parse a CLI-style literal: integers, floats, booleans, `null`, else string.
    pub fn parse_literal(raw: &str) -> Self {
        if raw == "null" {
            return PropertyValue::Null;
        }
        if let Ok(b) = raw.parse::<bool>() {
            return PropertyValue::Bool(b);
        }
        if let Ok(n) = raw.parse::<i64>() {
            return PropertyValue::Integer(n);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return PropertyValue::Float(f);
        }
        PropertyValue::String(raw.to_string())
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => write!(f, "null"),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Integer(n) => write!(f, "{}", n),
            PropertyValue::Float(x) => write!(f, "{}", x),
            PropertyValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::Integer(n)
    }
}

impl From<u8> for PropertyValue {
    fn from(n: u8) -> Self {
        PropertyValue::Integer(i64::from(n))
    }
}

impl From<f64> for PropertyValue {
    fn from(x: f64) -> Self {
        PropertyValue::Float(x)
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(PropertyValue::Null)
    }
}

/// Event properties, ordered by key so payloads and hashes are stable.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Build a [`Properties`] map from `key => value` pairs.
///
/// ```rust
/// use pagetrail_core::props;
///
/// let p = props! { "depth" => 25u8, "path" => "/" };
/// assert_eq!(p.len(), 2);
/// ```
#[macro_export]
macro_rules! props {
    () => { $crate::types::Properties::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::types::Properties::new();
        $( map.insert(($key).to_string(), $crate::types::PropertyValue::from($value)); )+
        map
    }};
}

// ============================================
// Tracked events
// ============================================

/// A named event with its properties, as handed to a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    /// Event name (never empty)
    pub name: String,
    /// Flat scalar properties
    pub properties: Properties,
    /// When the triggering interaction was observed
    pub time: DateTime<Utc>,
}

impl TrackedEvent {
    /// Create an event stamped with the current time.
    ///
    /// Fails if the name is empty or whitespace.
    pub fn new(name: impl Into<String>, properties: Properties) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidEvent("event name must not be empty".to_string()));
        }
        Ok(Self {
            name,
            properties,
            time: Utc::now(),
        })
    }

    /// Look up a property by key
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}

// ============================================
// Page model
// ============================================

/// Current location of the browsing context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Full URL (`https://example.com/pricing?ref=x`)
    pub href: String,
    /// Path component (`/pricing`)
    pub path: String,
}

impl Location {
    pub fn new(href: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            path: path.into(),
        }
    }
}

/// One scroll-position sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollMetrics {
    /// Pixels scrolled from the top of the document
    pub scroll_top: f64,
    /// Full document height in pixels
    pub document_height: f64,
    /// Visible viewport height in pixels
    pub viewport_height: f64,
}

impl ScrollMetrics {
    pub fn new(scroll_top: f64, document_height: f64, viewport_height: f64) -> Self {
        Self {
            scroll_top,
            document_height,
            viewport_height,
        }
    }

    /// Scroll depth as a whole percentage in `[0, 100]`.
    ///
    /// Pages with nothing to scroll always report 0.
    pub fn percentage(&self) -> u8 {
        let scrollable = self.document_height - self.viewport_height;
        if scrollable <= 0.0 || !scrollable.is_finite() {
            return 0;
        }
        let raw = (100.0 * self.scroll_top / scrollable.max(1.0)).round();
        if raw.is_nan() {
            return 0;
        }
        raw.clamp(0.0, 100.0) as u8
    }
}

/// Semantic metadata attached to an interactive element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionTag {
    /// Page section the element lives in (`hero`, `nav`, ...)
    pub section: String,
    /// What activating the element means (`scroll_to_features`, ...)
    pub action: String,
}

impl InteractionTag {
    pub fn new(section: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            action: action.into(),
        }
    }
}
