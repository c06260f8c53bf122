//! Collector wire format
//!
//! Converts a [`TrackedEvent`] into the JSON envelope the collector expects.
//!
//! ## Envelope
//!
//! ```json
//! {
//!   "event": "Scroll Depth",
//!   "properties": {
//!     "token": "abc123",
//!     "distinct_id": "5b0c...",
//!     "time": 1735689600000,
//!     "$insert_id": "9f2c...",
//!     "depth": 50,
//!     "platform": "web"
//!   }
//! }
//! ```
//!
//! `$insert_id` is a content hash, so the collector can drop duplicates if the
//! same event is ever delivered twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{Properties, TrackedEvent};

/// One event as posted to `/track`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEvent {
    pub event: String,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl WireEvent {
    /// Build the envelope for `event`, with `defaults` merged underneath its properties.
    pub fn from_event(
        event: &TrackedEvent,
        token: &str,
        distinct_id: &str,
        defaults: &Properties,
    ) -> Self {
        let merged = super::with_defaults(defaults, &event.properties);
        let mut properties = serde_json::Map::new();

        for (key, value) in &merged {
            properties.insert(
                key.clone(),
                serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
            );
        }

        properties.insert("token".to_string(), token.into());
        properties.insert("distinct_id".to_string(), distinct_id.into());
        properties.insert("time".to_string(), event.time.timestamp_millis().into());
        properties.insert(
            "$insert_id".to_string(),
            compute_insert_id(&event.name, &event.time, &event.properties).into(),
        );

        WireEvent {
            event: event.name.clone(),
            properties,
        }
    }

    pub fn insert_id(&self) -> Option<&str> {
        self.properties.get("$insert_id").and_then(|v| v.as_str())
    }
}

/// One profile update as posted to `/engage`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireProfile {
    #[serde(rename = "$token")]
    pub token: String,
    #[serde(rename = "$distinct_id")]
    pub distinct_id: String,
    /// Anonymous id this profile was previously known under
    #[serde(rename = "$anon_id", skip_serializing_if = "Option::is_none")]
    pub anon_id: Option<String>,
    #[serde(rename = "$set")]
    pub set: Properties,
}

/// Response from POST `/track`
///
/// Collectors that reply with an empty or non-JSON body are treated as
/// accepting the whole batch.
#[derive(Debug, Default, Deserialize)]
pub struct TrackResponse {
    /// Number of events accepted
    #[serde(default)]
    pub accepted: usize,
    /// Number of events rejected (duplicates, validation errors)
    #[serde(default)]
    pub rejected: usize,
}

/// Compute a content-based id for collector-side deduplication
///
/// Returns a 32-character hex digest of SHA-256(name + time + properties)
pub fn compute_insert_id(name: &str, time: &DateTime<Utc>, properties: &Properties) -> String {
    let content = serde_json::to_string(properties).unwrap_or_default();
    let hash_input = format!("{}:{}:{}", name, time.to_rfc3339(), content);

    let mut hasher = Sha256::new();
    hasher.update(hash_input.as_bytes());
    let result = hasher.finalize();

    // First 16 bytes (32 hex chars)
    hex::encode(&result[..16])
}
