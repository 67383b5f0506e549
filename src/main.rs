//! Codepulse Agent CLI
//!
//! Reads host-editor events as line-delimited JSON on standard input and
//! dispatches heartbeat batches to the reporting CLI.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use codepulse_agent::{
    ActivityEngine, ActivityLog, Config, EditorEvent, EngineOutput, HeartbeatBatch, Reporter,
    ReporterConfig, ReporterError, StatusUpdate, VERSION,
};
use crossbeam_channel::{unbounded, Sender};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "codepulse")]
#[command(version = VERSION)]
#[command(about = "Editor-activity telemetry agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent: read editor events from stdin, dispatch heartbeats
    Run {
        /// Reporting CLI binary (overrides the configured location)
        #[arg(long)]
        cli: Option<PathBuf>,

        /// Override the configured AI-capability flag
        #[arg(long)]
        ai_capable: Option<bool>,
    },

    /// Show resolved configuration and paths
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { cli, ai_capable } => cmd_run(cli, ai_capable),
        Commands::Config => cmd_config(),
    }
}

fn cmd_run(cli_override: Option<PathBuf>, ai_capable: Option<bool>) -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if config.debug { "debug" } else { "info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if config.disabled {
        info!("agent disabled in config; exiting");
        return Ok(());
    }
    if let Err(e) = config.ensure_directories() {
        warn!(error = %e, "could not create data directory");
    }

    let ai_capabilities = ai_capable.unwrap_or(config.ai_capabilities);
    let mut engine = ActivityEngine::new(ai_capabilities, config.api_key.is_some())
        .with_activity_log(ActivityLog::new(config.log_path()));

    let cli_path = cli_override.unwrap_or_else(|| config.cli_location());
    let mut reporter = Reporter::new(ReporterConfig {
        cli_path,
        api_key: config.api_key.clone(),
        api_url: config.api_url.clone(),
        user_agent: config.user_agent(),
        metrics: config.metrics,
    });

    info!(version = VERSION, ai_capabilities, "codepulse agent started");

    let (event_tx, event_rx) = unbounded::<EditorEvent>();
    thread::spawn(move || read_events(event_tx));

    let (outcome_tx, outcome_rx) = unbounded::<Result<i32, ReporterError>>();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))
        .context("setting ctrl-c handler")?;

    // Main event loop: all engine state is mutated here and only here.
    while running.load(Ordering::SeqCst) {
        let timeout = poll_timeout(&engine);
        crossbeam_channel::select! {
            recv(event_rx) -> msg => match msg {
                Ok(event) => {
                    let output = engine.handle_event(event, Utc::now());
                    process_output(output, &reporter, &outcome_tx);
                }
                // Host editor closed the stream.
                Err(_) => break,
            },
            recv(outcome_rx) -> msg => {
                if let Ok(result) = msg {
                    handle_dispatch_result(result, &mut engine, &mut reporter);
                }
            }
            default(timeout) => {
                let output = engine.poll(Utc::now());
                process_output(output, &reporter, &outcome_tx);
            }
        }
    }

    // Final flush so buffered heartbeats survive shutdown.
    let output = engine.shutdown(Utc::now());
    for notice in &output.notices {
        render_notice(notice);
    }
    if let Some(batch) = output.batch {
        match reporter.dispatch(&batch) {
            Ok(code) => {
                for notice in engine.handle_outcome(code, Utc::now()) {
                    render_notice(&notice);
                }
            }
            Err(e) => error!(error = %e, "final dispatch failed"),
        }
    }

    info!("codepulse agent stopped");
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load().context("loading config")?;
    println!("Config file:   {}", Config::config_path().display());
    println!("Data path:     {}", config.data_path.display());
    println!("Activity log:  {}", config.log_path().display());
    println!("Reporting CLI: {}", config.cli_location().display());
    println!(
        "Api url:       {}",
        config.api_url.as_deref().unwrap_or("(default)")
    );
    println!(
        "Api key:       {}",
        if config.api_key.is_some() { "set" } else { "not set" }
    );
    println!("AI capable:    {}", config.ai_capabilities);
    println!("Disabled:      {}", config.disabled);
    Ok(())
}

/// Blocking stdin reader feeding the main loop. Malformed lines are skipped,
/// never fatal.
fn read_events(tx: Sender<EditorEvent>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                debug!(error = %e, "stdin read error");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<EditorEvent>(trimmed) {
            Ok(event) => {
                if tx.send(event).is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "skipping malformed event line"),
        }
    }
}

/// How long the loop may sleep before the engine needs a timer poll.
fn poll_timeout(engine: &ActivityEngine) -> Duration {
    const MAX_WAIT: Duration = Duration::from_millis(100);
    match engine.next_deadline() {
        Some(deadline) => {
            let now = Utc::now();
            if deadline <= now {
                Duration::ZERO
            } else {
                (deadline - now).to_std().unwrap_or(MAX_WAIT).min(MAX_WAIT)
            }
        }
        None => MAX_WAIT,
    }
}

fn process_output(
    output: EngineOutput,
    reporter: &Reporter,
    outcome_tx: &Sender<Result<i32, ReporterError>>,
) {
    for notice in &output.notices {
        render_notice(notice);
    }
    if let Some(batch) = output.batch {
        dispatch_in_background(batch, reporter.clone(), outcome_tx.clone());
    }
}

/// Run one dispatch on a worker thread. The batch is owned by the dispatch;
/// the completion status comes back to the main loop over the channel.
fn dispatch_in_background(
    batch: HeartbeatBatch,
    reporter: Reporter,
    outcome_tx: Sender<Result<i32, ReporterError>>,
) {
    thread::spawn(move || {
        let result = reporter.dispatch(&batch);
        let _ = outcome_tx.send(result);
    });
}

fn handle_dispatch_result(
    result: Result<i32, ReporterError>,
    engine: &mut ActivityEngine,
    reporter: &mut Reporter,
) {
    match result {
        Ok(code) => {
            let notices = engine.handle_outcome(code, Utc::now());
            let synced = notices.contains(&StatusUpdate::Synced);
            for notice in &notices {
                render_notice(notice);
            }
            if synced {
                if let Some(summary) = reporter.fetch_today(Utc::now()) {
                    if !summary.text.is_empty() {
                        info!(today = %summary.text, "coding activity");
                    }
                }
            }
        }
        Err(e) => error!(error = %e, "heartbeat dispatch failed"),
    }
}

fn render_notice(notice: &StatusUpdate) {
    match notice {
        StatusUpdate::Synced => debug!("heartbeats accepted"),
        StatusUpdate::Offline { code } => {
            warn!(code, "working offline; activity will sync when back online");
        }
        StatusUpdate::ConfigParseError => {
            error!("reporting cli could not parse its config; check the activity log");
        }
        StatusUpdate::AuthRejected { prompt_api_key } => {
            if *prompt_api_key {
                error!(
                    "invalid api key; update api_key in {}",
                    Config::config_path().display()
                );
            } else {
                error!("invalid api key");
            }
        }
        StatusUpdate::DispatchFailed { code } => {
            error!(code, "unclassified reporting error; check the activity log");
        }
        StatusUpdate::ApiKeyMissing => {
            warn!("no api key configured; heartbeats stay buffered until one is set");
        }
    }
}
