//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/pagetrail/config.toml`. The
//! analytics token may also come from the `PAGETRAIL_TOKEN` environment
//! variable, which takes precedence over the file.
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/pagetrail/` (~/.config/pagetrail/)
//! - State/Logs: `$XDG_STATE_HOME/pagetrail/` (~/.local/state/pagetrail/)

use crate::error::{Error, Result};
use crate::scroll::ThresholdSet;
use crate::types::InteractionTag;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable holding the analytics token
pub const TOKEN_ENV: &str = "PAGETRAIL_TOKEN";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Analytics pipeline configuration
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// HTTP collector configuration
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Interaction tag table
    #[serde(default)]
    pub tags: Vec<TagEntry>,
}

/// How the sink keeps the anonymous visitor id between runs
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Persistence {
    /// Fresh id every run
    Memory,
    /// Id stored under the state directory
    #[default]
    File,
}

impl Persistence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persistence::Memory => "memory",
            Persistence::File => "file",
        }
    }
}

/// Analytics pipeline configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    /// Project token (overridden by `PAGETRAIL_TOKEN`)
    pub token: Option<String>,

    /// Deployment environment registered as a default property
    #[serde(default = "default_environment")]
    pub environment: String,

    /// App version registered as a default property (defaults to the crate version)
    pub app_version: Option<String>,

    /// Log every tracked event at info level
    #[serde(default)]
    pub debug: bool,

    /// Visitor id persistence mode
    #[serde(default)]
    pub persistence: Persistence,

    /// Bind every interactive element, not just tagged ones
    #[serde(default = "default_autocapture")]
    pub autocapture: bool,

    /// Scroll-depth thresholds in percent (strictly increasing, 0..=100)
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<u8>,

    /// Optional page identifier added to scroll events
    pub page_id: Option<String>,

    /// Frame rate for the interval frame clock
    #[serde(default = "default_frame_rate")]
    pub frame_rate_hz: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            token: None,
            environment: default_environment(),
            app_version: None,
            debug: false,
            persistence: Persistence::default(),
            autocapture: default_autocapture(),
            thresholds: default_thresholds(),
            page_id: None,
            frame_rate_hz: default_frame_rate(),
        }
    }
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_autocapture() -> bool {
    true
}

fn default_thresholds() -> Vec<u8> {
    vec![25, 50, 75, 90, 100]
}

fn default_frame_rate() -> u32 {
    60
}

impl AnalyticsConfig {
    /// App version to register, falling back to this crate's version
    pub fn app_version(&self) -> String {
        self.app_version
            .clone()
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
    }

    /// Build the validated threshold set
    pub fn threshold_set(&self) -> Result<ThresholdSet> {
        ThresholdSet::new(self.thresholds.clone())
    }
}

/// HTTP collector configuration
///
/// Used by [`HttpSink`](crate::sink::HttpSink) to deliver events.
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Collector base URL (e.g., `https://collector.example.com`)
    pub server_url: Option<String>,

    /// Events per request (max 50, default 20)
    #[serde(default = "default_collector_batch_size")]
    pub batch_size: usize,

    /// Max milliseconds before flushing an incomplete batch
    #[serde(default = "default_collector_flush_interval")]
    pub flush_interval_ms: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_collector_timeout")]
    pub timeout_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            batch_size: default_collector_batch_size(),
            flush_interval_ms: default_collector_flush_interval(),
            timeout_secs: default_collector_timeout(),
        }
    }
}

impl CollectorConfig {
    /// Check if a collector endpoint is configured
    pub fn is_ready(&self) -> bool {
        self.server_url.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.server_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "collector.server_url must be an http(s) URL, got {:?}",
                    url
                )));
            }
        }
        if self.batch_size == 0 || self.batch_size > 50 {
            return Err(Error::Config(
                "collector.batch_size must be between 1 and 50".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "collector.timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_collector_batch_size() -> usize {
    20
}

fn default_collector_flush_interval() -> u64 {
    1000
}

fn default_collector_timeout() -> u64 {
    10
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// One row of the interaction tag table
///
/// ```toml
/// [[tags]]
/// element = "hero-get-started"
/// section = "hero"
/// action = "scroll_to_features"
/// ```
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TagEntry {
    /// Element identifier on the page
    pub element: String,
    pub section: String,
    pub action: String,
}

impl TagEntry {
    pub fn tag(&self) -> InteractionTag {
        InteractionTag::new(&self.section, &self.action)
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.analytics.threshold_set()?;
        self.collector.validate()?;
        if self.analytics.frame_rate_hz == 0 || self.analytics.frame_rate_hz > 240 {
            return Err(Error::Config(
                "analytics.frame_rate_hz must be between 1 and 240".to_string(),
            ));
        }
        for entry in &self.tags {
            if entry.element.trim().is_empty() {
                return Err(Error::Config("tags.element must not be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Resolve the analytics token.
    ///
    /// `PAGETRAIL_TOKEN` wins over `[analytics].token`. Returns an empty
    /// string when neither is set; the facade treats that as "disabled".
    pub fn token(&self) -> String {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.analytics.token.clone())
            .unwrap_or_default()
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/pagetrail/config.toml` (~/.config/pagetrail/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("pagetrail").join("config.toml")
    }

    /// Returns the state directory path (for logs and the visitor id)
    ///
    /// `$XDG_STATE_HOME/pagetrail/` (~/.local/state/pagetrail/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("pagetrail")
    }

    /// Returns the persisted visitor identity path
    ///
    /// `$XDG_STATE_HOME/pagetrail/identity.json`
    pub fn identity_path() -> PathBuf {
        Self::state_dir().join("identity.json")
    }
}
