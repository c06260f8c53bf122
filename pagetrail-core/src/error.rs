//! Error types for pagetrail-core

use thiserror::Error;

/// Main error type for the pagetrail-core library
///
/// The first three variants form the pipeline's degradation taxonomy. None of
/// them ever reaches the page: the facade logs them and carries on as a no-op.
#[derive(Error, Debug)]
pub enum Error {
    /// No token, or no browsing context to run in
    #[error("analytics configuration missing: {0}")]
    ConfigurationMissing(String),

    /// Facade used before (or without) a successful initialize
    #[error("event sink unavailable: session not initialized")]
    SinkUnavailable,

    /// The sink rejected or failed a dispatch
    #[error("event sink call failed: {0}")]
    SinkCall(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Threshold set violates ordering or range
    #[error("invalid scroll thresholds: {0}")]
    InvalidThresholds(String),

    /// Event failed validation (empty name, etc.)
    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

/// Result type alias for pagetrail-core
pub type Result<T> = std::result::Result<T, Error>;
