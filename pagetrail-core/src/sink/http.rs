//! HTTP collector sink
//!
//! Events are converted to [`WireEvent`]s and handed to a background worker
//! over an unbounded channel, so `track` never waits on the network. The
//! worker batches events and posts them to `{server_url}/track` when:
//! - Batch size threshold is reached
//! - Flush interval expires
//! - `flush` or `flush_and_wait` is called, or the sink is dropped
//!
//! `flush` only enqueues the request, so it is safe on the page's own path
//! (unload). `flush_and_wait` blocks until the worker has attempted every
//! queued batch and is meant for session end.
//!
//! Profile updates from `identify` go to `{server_url}/engage` after any
//! buffered events, so the collector sees calls in the order they were made.
//!
//! Delivery is best effort. A failed request is logged and its events are
//! dropped; nothing is retried.
//!
//! The sink owns its own tokio runtime. It must be used (and dropped) from
//! synchronous code, not from inside another runtime.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{CollectorConfig, Config, Persistence};
use crate::error::{Error, Result};
use crate::types::{Properties, TrackedEvent};

use super::wire::{TrackResponse, WireEvent, WireProfile};
use super::{EventSink, SinkOptions};

/// Delivery statistics reported by the worker
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Events the collector accepted
    pub events_sent: usize,
    /// Events the collector rejected (duplicates, validation errors)
    pub events_rejected: usize,
    /// Events lost to failed requests
    pub events_dropped: usize,
    /// Profile updates delivered
    pub profiles_sent: usize,
    /// Number of HTTP requests made
    pub api_calls: usize,
    /// Number of failed HTTP requests
    pub api_failures: usize,
}

enum Command {
    Track(WireEvent),
    Engage(WireProfile),
    /// Send the buffer now; acknowledge with the running stats if asked
    Flush(Option<oneshot::Sender<DeliveryStats>>),
}

/// Persisted visitor identity
#[derive(Debug, Serialize, Deserialize)]
struct StoredIdentity {
    distinct_id: String,
}

/// Live connection state, created by `init`
struct Connection {
    token: String,
    distinct_id: String,
    tx: mpsc::UnboundedSender<Command>,
    worker: JoinHandle<()>,
    runtime: tokio::runtime::Runtime,
}

impl Connection {
    /// Close the channel and give the worker `wait` to drain its buffer.
    fn shutdown(self, wait: Duration) {
        let Connection {
            tx,
            worker,
            runtime,
            ..
        } = self;
        drop(tx);
        if runtime
            .block_on(async { tokio::time::timeout(wait, worker).await })
            .is_err()
        {
            tracing::warn!("Collector worker did not drain before shutdown");
        }
    }
}

/// Sink that delivers events to an HTTP collector.
pub struct HttpSink {
    config: CollectorConfig,
    base_url: String,
    identity_path: PathBuf,
    options: SinkOptions,
    defaults: Properties,
    connection: Option<Connection>,
    last_stats: DeliveryStats,
}

impl HttpSink {
    /// Create a sink from collector configuration
    ///
    /// Returns an error if the configuration is invalid or has no server URL.
    pub fn new(config: CollectorConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .server_url
            .clone()
            .ok_or_else(|| Error::Config("collector.server_url is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            config,
            base_url,
            identity_path: Config::identity_path(),
            options: SinkOptions::default(),
            defaults: Properties::new(),
            connection: None,
            last_stats: DeliveryStats::default(),
        })
    }

    /// Store the visitor identity somewhere other than the state directory
    pub fn with_identity_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_path = path.into();
        self
    }

    /// Current distinct id, once initialized
    pub fn distinct_id(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.distinct_id.as_str())
    }

    /// Statistics as of the last completed `flush_and_wait`
    pub fn stats(&self) -> &DeliveryStats {
        &self.last_stats
    }

    fn connection(&self) -> Result<&Connection> {
        self.connection.as_ref().ok_or(Error::SinkUnavailable)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.connection()?
            .tx
            .send(command)
            .map_err(|_| Error::SinkCall("collector worker stopped".to_string()))
    }

    fn build_client(&self, token: &str) -> Result<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| Error::Config(format!("invalid token: {}", e)))?,
        );

        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))
    }

    fn persist_identity(&self, distinct_id: &str) {
        if self.options.persistence != Persistence::File {
            return;
        }
        if let Err(e) = write_identity(&self.identity_path, distinct_id) {
            tracing::warn!(
                path = %self.identity_path.display(),
                error = %e,
                "Failed to persist visitor identity"
            );
        }
    }
}

impl EventSink for HttpSink {
    fn name(&self) -> &'static str {
        "http"
    }

    fn init(&mut self, token: &str, options: &SinkOptions) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }
        self.options = *options;

        let client = self.build_client(token)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("pagetrail-collector")
            .enable_all()
            .build()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = runtime.spawn(run_worker(
            client,
            self.base_url.clone(),
            self.config.batch_size,
            Duration::from_millis(self.config.flush_interval_ms.max(1)),
            rx,
        ));

        let distinct_id = match options.persistence {
            Persistence::File => load_or_create_identity(&self.identity_path),
            Persistence::Memory => uuid::Uuid::new_v4().to_string(),
        };

        tracing::info!(
            server_url = %self.base_url,
            persistence = options.persistence.as_str(),
            autocapture = options.autocapture,
            "Collector sink initialized"
        );

        self.connection = Some(Connection {
            token: token.to_string(),
            distinct_id,
            tx,
            worker,
            runtime,
        });
        Ok(())
    }

    fn register_default_properties(&mut self, properties: Properties) -> Result<()> {
        self.defaults.extend(properties);
        Ok(())
    }

    fn identify(&mut self, user_id: &str, properties: &Properties) -> Result<()> {
        let conn = self.connection()?;
        let previous = conn.distinct_id.clone();
        let profile = WireProfile {
            token: conn.token.clone(),
            distinct_id: user_id.to_string(),
            anon_id: (previous != user_id).then_some(previous),
            set: properties.clone(),
        };
        self.send(Command::Engage(profile))?;

        if let Some(conn) = self.connection.as_mut() {
            conn.distinct_id = user_id.to_string();
        }
        self.persist_identity(user_id);
        Ok(())
    }

    fn track(&mut self, event: &TrackedEvent) -> Result<()> {
        let conn = self.connection()?;
        let wire = WireEvent::from_event(event, &conn.token, &conn.distinct_id, &self.defaults);

        if self.options.debug {
            tracing::info!(event = %wire.event, properties = ?wire.properties, "Tracked event");
        }

        self.send(Command::Track(wire))
    }

    fn flush(&mut self) -> Result<()> {
        self.send(Command::Flush(None))
    }

    fn flush_and_wait(&mut self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Flush(Some(ack_tx)))?;

        // one request timeout for the flush itself plus slack for queued batches
        let wait = Duration::from_secs(self.config.timeout_secs.saturating_mul(2));
        let conn = self.connection()?;
        let stats = conn
            .runtime
            .block_on(async { tokio::time::timeout(wait, ack_rx).await })
            .map_err(|_| Error::SinkCall("flush timed out".to_string()))?
            .map_err(|_| Error::SinkCall("collector worker stopped".to_string()))?;

        tracing::debug!(
            sent = stats.events_sent,
            dropped = stats.events_dropped,
            api_calls = stats.api_calls,
            "Collector flushed"
        );
        self.last_stats = stats;
        Ok(())
    }
}

impl Drop for HttpSink {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.shutdown(Duration::from_secs(self.config.timeout_secs));
        }
    }
}

/// Read the stored visitor id, or mint and store a new one.
///
/// Storage problems never fail initialization; the visitor just gets a
/// fresh id for this run.
fn load_or_create_identity(path: &Path) -> String {
    if let Ok(content) = std::fs::read_to_string(path) {
        match serde_json::from_str::<StoredIdentity>(&content) {
            Ok(stored) if !stored.distinct_id.is_empty() => return stored.distinct_id,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt identity file")
            }
        }
    }

    let distinct_id = uuid::Uuid::new_v4().to_string();
    if let Err(e) = write_identity(path, &distinct_id) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to persist visitor identity");
    }
    distinct_id
}

fn write_identity(path: &Path, distinct_id: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let stored = StoredIdentity {
        distinct_id: distinct_id.to_string(),
    };
    std::fs::write(path, serde_json::to_vec_pretty(&stored)?)?;
    Ok(())
}

async fn run_worker(
    client: reqwest::Client,
    base_url: String,
    batch_size: usize,
    flush_interval: Duration,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut buffer: Vec<WireEvent> = Vec::new();
    let mut stats = DeliveryStats::default();
    // the first tick is one full interval away, not immediate
    let mut ticker =
        tokio::time::interval_at(tokio::time::Instant::now() + flush_interval, flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Track(event)) => {
                    buffer.push(event);
                    if buffer.len() >= batch_size {
                        send_batch(&client, &base_url, &mut buffer, &mut stats).await;
                    }
                }
                Some(Command::Engage(profile)) => {
                    send_batch(&client, &base_url, &mut buffer, &mut stats).await;
                    send_profile(&client, &base_url, &profile, &mut stats).await;
                }
                Some(Command::Flush(ack)) => {
                    send_batch(&client, &base_url, &mut buffer, &mut stats).await;
                    if let Some(ack) = ack {
                        let _ = ack.send(stats.clone());
                    }
                }
                None => {
                    send_batch(&client, &base_url, &mut buffer, &mut stats).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                send_batch(&client, &base_url, &mut buffer, &mut stats).await;
            }
        }
    }

    tracing::debug!(
        sent = stats.events_sent,
        dropped = stats.events_dropped,
        "Collector worker stopped"
    );
}

/// Post all buffered events as one batch. Failures drop the batch.
async fn send_batch(
    client: &reqwest::Client,
    base_url: &str,
    buffer: &mut Vec<WireEvent>,
    stats: &mut DeliveryStats,
) {
    if buffer.is_empty() {
        return;
    }
    let events: Vec<WireEvent> = std::mem::take(buffer);
    let url = format!("{}/track", base_url);
    stats.api_calls += 1;

    match post_json(client, &url, &events).await {
        Ok(body) => {
            let response: TrackResponse = serde_json::from_str(&body).unwrap_or_default();
            let (accepted, rejected) = if response.accepted + response.rejected == 0 {
                (events.len(), 0)
            } else {
                (response.accepted, response.rejected)
            };
            stats.events_sent += accepted;
            stats.events_rejected += rejected;
            tracing::debug!(accepted, rejected, "Published events to collector");
        }
        Err(e) => {
            stats.api_failures += 1;
            stats.events_dropped += events.len();
            tracing::warn!(
                events = events.len(),
                error = %e,
                "Failed to publish events to collector"
            );
        }
    }
}

async fn send_profile(
    client: &reqwest::Client,
    base_url: &str,
    profile: &WireProfile,
    stats: &mut DeliveryStats,
) {
    let url = format!("{}/engage", base_url);
    stats.api_calls += 1;

    match post_json(client, &url, &[profile]).await {
        Ok(_) => stats.profiles_sent += 1,
        Err(e) => {
            stats.api_failures += 1;
            tracing::warn!(
                distinct_id = %profile.distinct_id,
                error = %e,
                "Failed to publish profile update"
            );
        }
    }
}

async fn post_json<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    body: &T,
) -> Result<String> {
    let response = client.post(url).json(body).send().await?;

    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown".to_string());

    if status.is_success() {
        Ok(text)
    } else {
        Err(Error::SinkCall(format!("API error ({}): {}", status, text)))
    }
}
