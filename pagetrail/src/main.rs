//! pagetrail - page analytics event pipeline
//!
//! This tool provides commands for:
//! - Checking analytics and collector configuration
//! - Replaying recorded page visits through the pipeline
//! - Sending one-off events
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/pagetrail/config.toml (~/.config/pagetrail/config.toml)
//! - State/Logs: $XDG_STATE_HOME/pagetrail/ (~/.local/state/pagetrail/)

mod replay;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pagetrail_core::config::TOKEN_ENV;
use pagetrail_core::sink::EventSink;
use pagetrail_core::{
    Analytics, Config, HttpSink, MemorySink, Pipeline, Properties, PropertyValue, SimulatedPage,
};

use crate::replay::Replayer;

#[derive(Parser)]
#[command(name = "pagetrail")]
#[command(about = "Page analytics event pipeline")]
#[command(version)]
struct Args {
    /// Verbose output (logs to the state directory)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the XDG default
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show analytics and collector configuration
    Status,

    /// Replay a recorded visit (JSON Lines) through the pipeline
    Replay {
        /// Path to the replay script
        script: PathBuf,

        /// Record events locally and print them instead of sending
        #[arg(long)]
        dry_run: bool,

        /// Analytics token (default: $PAGETRAIL_TOKEN or config)
        #[arg(long)]
        token: Option<String>,

        /// Origin of the simulated page
        #[arg(long, default_value = "https://example.com")]
        origin: String,

        /// Frame rate in Hz (default: from config)
        #[arg(long)]
        frame_rate: Option<u32>,
    },

    /// Track a single event
    Track {
        /// Event name
        name: String,

        /// Event property as key=value (repeatable)
        #[arg(short = 'p', long = "property", value_parser = parse_property)]
        properties: Vec<(String, PropertyValue)>,

        /// Page path the event happened on
        #[arg(long, default_value = "/")]
        path: String,

        /// Origin of the simulated page
        #[arg(long, default_value = "https://example.com")]
        origin: String,

        /// Record the event locally and print it instead of sending
        #[arg(long)]
        dry_run: bool,

        /// Analytics token (default: $PAGETRAIL_TOKEN or config)
        #[arg(long)]
        token: Option<String>,
    },
}

fn parse_property(raw: &str) -> std::result::Result<(String, PropertyValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty property key in '{}'", raw));
    }
    Ok((key.to_string(), PropertyValue::parse_literal(value)))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };

    // Keep the guard alive for the whole run
    let _log_guard = if args.verbose {
        Some(pagetrail_core::logging::init(&config.logging).context("failed to initialize logging")?)
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config, args.config.as_deref()),
        Command::Replay {
            script,
            dry_run,
            token,
            origin,
            frame_rate,
        } => cmd_replay(&config, &script, dry_run, token, &origin, frame_rate),
        Command::Track {
            name,
            properties,
            path,
            origin,
            dry_run,
            token,
        } => cmd_track(&config, &name, properties, &path, &origin, dry_run, token),
    }
}

fn cmd_status(config: &Config, config_override: Option<&Path>) -> Result<()> {
    let config_path = config_override
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::config_path);

    println!("pagetrail Configuration");
    println!("=======================");
    println!();
    println!(
        "Config file:     {}{}",
        config_path.display(),
        if config_path.exists() { "" } else { " (not found, using defaults)" }
    );
    println!("Log directory:   {}", pagetrail_core::logging::log_dir().display());
    println!();

    let analytics = &config.analytics;
    let token_source = if std::env::var(TOKEN_ENV).is_ok_and(|t| !t.trim().is_empty()) {
        format!("<set via {}>", TOKEN_ENV)
    } else if analytics.token.as_deref().is_some_and(|t| !t.trim().is_empty()) {
        "<set in config>".to_string()
    } else {
        "<not set> (analytics disabled)".to_string()
    };

    println!("Analytics");
    println!("---------");
    println!("Token:           {}", token_source);
    println!("Environment:     {}", analytics.environment);
    println!("App version:     {}", analytics.app_version());
    println!("Persistence:     {}", analytics.persistence.as_str());
    println!("Debug:           {}", analytics.debug);
    println!("Autocapture:     {}", analytics.autocapture);
    println!("Thresholds:      {:?}", analytics.thresholds);
    println!("Frame rate:      {} Hz", analytics.frame_rate_hz);
    if let Some(page_id) = &analytics.page_id {
        println!("Page id:         {}", page_id);
    }
    println!();

    let collector = &config.collector;
    println!("Collector");
    println!("---------");
    println!(
        "Server URL:      {}",
        collector.server_url.as_deref().unwrap_or("<not set>")
    );
    println!("Batch size:      {}", collector.batch_size);
    println!("Flush interval:  {} ms", collector.flush_interval_ms);
    println!("Timeout:         {} s", collector.timeout_secs);
    println!(
        "Ready:           {}",
        if collector.is_ready() { "yes" } else { "no" }
    );
    println!();

    println!("Interaction tags ({})", config.tags.len());
    println!("----------------");
    for entry in &config.tags {
        println!("  {:<28} {} / {}", entry.element, entry.section, entry.action);
    }
    println!();

    match config.validate() {
        Ok(()) => println!("Configuration is valid."),
        Err(e) => println!("Configuration error: {}", e),
    }

    Ok(())
}

/// The sink a command sends to, plus a handle for printing dry runs
fn build_sink(config: &Config, dry_run: bool) -> Result<(Box<dyn EventSink>, Option<MemorySink>)> {
    if dry_run {
        let sink = MemorySink::new();
        return Ok((Box::new(sink.clone()), Some(sink)));
    }

    if !config.collector.is_ready() {
        bail!("collector.server_url is not set; configure it or pass --dry-run");
    }
    let sink = HttpSink::new(config.collector.clone()).context("invalid collector configuration")?;
    Ok((Box::new(sink), None))
}

fn resolve_token(config: &Config, token: Option<String>) -> String {
    let token = token.unwrap_or_else(|| config.token());
    if token.trim().is_empty() {
        eprintln!("No analytics token configured (set {}); events will not be recorded.", TOKEN_ENV);
    }
    token
}

fn print_events(sink: &MemorySink) -> Result<()> {
    for event in sink.events() {
        println!("{}", serde_json::to_string(&event).context("failed to serialize event")?);
    }
    Ok(())
}

fn cmd_replay(
    config: &Config,
    script: &Path,
    dry_run: bool,
    token: Option<String>,
    origin: &str,
    frame_rate: Option<u32>,
) -> Result<()> {
    let steps = replay::load_script(script)?;
    let token = resolve_token(config, token);
    let (sink, recorded) = build_sink(config, dry_run)?;

    let mut config = config.clone();
    if let Some(rate) = frame_rate {
        config.analytics.frame_rate_hz = rate;
    }
    let pipeline = Pipeline::from_config(&config, sink).context("invalid configuration")?;

    tracing::info!(script = %script.display(), steps = steps.len(), "Replaying script");
    let summary = Replayer::new(pipeline, origin, config.analytics.frame_rate_hz, token)
        .run(steps)
        .with_context(|| format!("replay of {} failed", script.display()))?;

    if let Some(sink) = recorded {
        print_events(&sink)?;
    }

    eprintln!(
        "Replayed {} steps: {} page views, {} scroll events in {} frames{}",
        summary.steps,
        summary.page_views,
        summary.scroll_requests,
        summary.frames_run,
        if summary.active { "" } else { " (analytics disabled)" }
    );
    Ok(())
}

fn cmd_track(
    config: &Config,
    name: &str,
    properties: Vec<(String, PropertyValue)>,
    path: &str,
    origin: &str,
    dry_run: bool,
    token: Option<String>,
) -> Result<()> {
    if name.trim().is_empty() {
        bail!("event name must not be empty");
    }
    config.validate().context("invalid configuration")?;

    let token = resolve_token(config, token);
    let (sink, recorded) = build_sink(config, dry_run)?;
    let page = SimulatedPage::new(origin, path);

    let mut analytics = Analytics::from_config(&config.analytics, sink);
    analytics.initialize(&token, Some(&page));
    let properties: Properties = properties.into_iter().collect();
    analytics.track(name, properties);
    analytics.shutdown();

    if let Some(sink) = recorded {
        print_events(&sink)?;
    }
    Ok(())
}
