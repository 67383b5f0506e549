//! Dispatch to the reporting collaborator.
//!
//! Each drained batch becomes one invocation of the external reporting CLI:
//! the primary heartbeat travels as flat command-line arguments, extras as a
//! newline-terminated JSON array on the child's standard input. The CLI
//! answers with an integer completion status that the engine interprets
//! (see [`crate::engine::ActivityEngine::handle_outcome`]).

use crate::engine::{Category, Heartbeat, HeartbeatBatch};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, error};

/// Today-summary fetches are throttled to once per this interval.
pub const FETCH_TODAY_INTERVAL_MS: i64 = 60_000;

#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("failed to launch reporting cli at {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("io error while talking to the reporting cli: {0}")]
    Io(#[from] std::io::Error),
    #[error("reporting cli terminated without an exit status")]
    NoExitStatus,
    #[error("failed to encode extra heartbeats: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Everything the reporter needs to build an invocation.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    pub cli_path: PathBuf,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    /// Identifies the host editor and this agent to the backend.
    pub user_agent: String,
    pub metrics: bool,
}

/// Today's coding-activity summary as reported by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TodaySummary {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub has_team_features: bool,
}

#[derive(Debug, Clone)]
pub struct Reporter {
    config: ReporterConfig,
    last_fetch_today: Option<DateTime<Utc>>,
    cached_today: Option<TodaySummary>,
}

impl Reporter {
    pub fn new(config: ReporterConfig) -> Self {
        Self {
            config,
            last_fetch_today: None,
            cached_today: None,
        }
    }

    /// Send one batch and return the CLI's exit status. Temp-file snapshots
    /// carried by the batch are deleted once the child has completed,
    /// success or failure alike.
    pub fn dispatch(&self, batch: &HeartbeatBatch) -> Result<i32, ReporterError> {
        let result = self.run_heartbeat_cli(batch);
        cleanup_temp_files(batch);
        result
    }

    fn run_heartbeat_cli(&self, batch: &HeartbeatBatch) -> Result<i32, ReporterError> {
        let args = self.heartbeat_args(batch);
        debug!(cli = %self.config.cli_path.display(), count = batch.len(), "sending heartbeat batch");

        let mut command = Command::new(&self.config.cli_path);
        command
            .args(&args)
            .stdin(if batch.extras.is_empty() {
                Stdio::null()
            } else {
                Stdio::piped()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| ReporterError::Spawn {
            path: self.config.cli_path.clone(),
            source,
        })?;

        if !batch.extras.is_empty() {
            let payload = extras_payload(&batch.extras)?;
            if let Some(stdin) = child.stdin.as_mut() {
                stdin.write_all(payload.as_bytes())?;
            }
            // Closing stdin lets the child read EOF after the payload line.
            drop(child.stdin.take());
        }

        let output = child.wait_with_output()?;
        let code = output.status.code().ok_or(ReporterError::NoExitStatus)?;

        if code != 0 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                error!(code, stderr = %stderr.trim(), "reporting cli failed");
            }
        }
        Ok(code)
    }

    /// Fetch today's summary, at most once per minute and only when an api
    /// key is configured. A malformed response is discarded and the
    /// previously cached summary kept.
    pub fn fetch_today(&mut self, now: DateTime<Utc>) -> Option<TodaySummary> {
        let throttled = self
            .last_fetch_today
            .is_some_and(|t| (now - t).num_milliseconds() < FETCH_TODAY_INTERVAL_MS);
        if throttled || self.config.api_key.is_none() {
            return self.cached_today.clone();
        }
        self.last_fetch_today = Some(now);

        let args = self.today_args();
        debug!(cli = %self.config.cli_path.display(), "fetching today summary");
        let output = match Command::new(&self.config.cli_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                debug!(error = %e, "today fetch failed to launch");
                return self.cached_today.clone();
            }
        };

        match output.status.code() {
            Some(0) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                match serde_json::from_str::<TodaySummary>(stdout.trim()) {
                    Ok(summary) => self.cached_today = Some(summary),
                    Err(e) => {
                        debug!(error = %e, "discarding malformed today summary");
                    }
                }
            }
            Some(102) | Some(112) => {} // offline, keep quiet
            code => debug!(?code, "today fetch failed"),
        }
        self.cached_today.clone()
    }

    fn heartbeat_args(&self, batch: &HeartbeatBatch) -> Vec<String> {
        let heartbeat = &batch.primary;
        let mut args = vec![
            "--entity".to_string(),
            heartbeat.entity.clone(),
            "--time".to_string(),
            heartbeat.time.to_string(),
            "--plugin".to_string(),
            self.config.user_agent.clone(),
            "--lineno".to_string(),
            heartbeat.lineno.to_string(),
            "--cursorpos".to_string(),
            heartbeat.cursorpos.to_string(),
            "--lines-in-file".to_string(),
            heartbeat.lines_in_file.to_string(),
            // Always sent so the backend never stores an unset category.
            "--category".to_string(),
            heartbeat.category_or_default().as_str().to_string(),
        ];

        if let Some(delta) = heartbeat.ai_line_changes {
            args.push("--ai-line-changes".to_string());
            args.push(delta.to_string());
        }
        if let Some(delta) = heartbeat.human_line_changes {
            args.push("--human-line-changes".to_string());
            args.push(delta.to_string());
        }
        if self.config.metrics {
            args.push("--metrics".to_string());
        }
        if let Some(key) = &self.config.api_key {
            args.push("--key".to_string());
            args.push(key.clone());
        }
        if let Some(url) = &self.config.api_url {
            args.push("--api-url".to_string());
            args.push(url.clone());
        }
        if let Some(project) = &heartbeat.alternate_project {
            args.push("--alternate-project".to_string());
            args.push(project.clone());
        }
        if let Some(folder) = &heartbeat.project_folder {
            args.push("--project-folder".to_string());
            args.push(folder.clone());
        }
        if heartbeat.is_write {
            args.push("--write".to_string());
        }
        if heartbeat.is_unsaved_entity.unwrap_or(false) {
            args.push("--is-unsaved-entity".to_string());
        }
        if let Some(local) = &heartbeat.local_file {
            args.push("--local-file".to_string());
            args.push(local.clone());
        }
        if !batch.extras.is_empty() {
            args.push("--extra-heartbeats".to_string());
        }
        args
    }

    fn today_args(&self) -> Vec<String> {
        let mut args = vec![
            "--today".to_string(),
            "--output".to_string(),
            "json".to_string(),
            "--plugin".to_string(),
            self.config.user_agent.clone(),
        ];
        if self.config.metrics {
            args.push("--metrics".to_string());
        }
        if let Some(key) = &self.config.api_key {
            args.push("--key".to_string());
            args.push(key.clone());
        }
        if let Some(url) = &self.config.api_url {
            args.push("--api-url".to_string());
            args.push(url.clone());
        }
        args
    }
}

/// Extra heartbeats as a newline-terminated JSON array, every record
/// normalized to carry a category.
fn extras_payload(extras: &[Heartbeat]) -> serde_json::Result<String> {
    let normalized: Vec<Heartbeat> = extras
        .iter()
        .map(|h| {
            let mut h = h.clone();
            h.category = Some(h.category.unwrap_or(Category::Coding));
            h
        })
        .collect();
    let mut payload = serde_json::to_string(&normalized)?;
    payload.push('\n');
    Ok(payload)
}

fn cleanup_temp_files(batch: &HeartbeatBatch) {
    for path in batch.temp_files() {
        if let Err(e) = std::fs::remove_file(path) {
            debug!(path, error = %e, "failed to remove temp snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat(entity: &str) -> Heartbeat {
        Heartbeat {
            entity: entity.to_string(),
            time: 1_700_000_000.25,
            is_write: false,
            lineno: 11,
            cursorpos: 5,
            lines_in_file: 120,
            category: Some(Category::Coding),
            alternate_project: None,
            project_folder: None,
            ai_line_changes: None,
            human_line_changes: None,
            local_file: None,
            is_unsaved_entity: None,
        }
    }

    fn reporter() -> Reporter {
        Reporter::new(ReporterConfig {
            cli_path: PathBuf::from("reporting-cli"),
            api_key: Some("secret".to_string()),
            api_url: None,
            user_agent: "test-editor/1.0 codepulse-agent/0.1.0".to_string(),
            metrics: false,
        })
    }

    #[test]
    fn test_minimal_args() {
        let batch = HeartbeatBatch {
            primary: heartbeat("/a.rs"),
            extras: vec![],
        };
        let args = reporter().heartbeat_args(&batch);
        let joined = args.join(" ");
        assert!(joined.starts_with("--entity /a.rs --time 1700000000.25"));
        assert!(joined.contains("--lineno 11 --cursorpos 5 --lines-in-file 120"));
        assert!(joined.contains("--category coding"));
        assert!(joined.contains("--key secret"));
        assert!(!joined.contains("--write"));
        assert!(!joined.contains("--extra-heartbeats"));
    }

    #[test]
    fn test_full_args() {
        let mut primary = heartbeat("remote://b.rs");
        primary.is_write = true;
        primary.category = Some(Category::AiCoding);
        primary.ai_line_changes = Some(12);
        primary.human_line_changes = Some(-3);
        primary.alternate_project = Some("proj".to_string());
        primary.project_folder = Some("/work/proj".to_string());
        primary.is_unsaved_entity = Some(true);
        primary.local_file = Some("/tmp/snap".to_string());
        let batch = HeartbeatBatch {
            primary,
            extras: vec![heartbeat("/c.rs")],
        };

        let args = reporter().heartbeat_args(&batch);
        let joined = args.join(" ");
        assert!(joined.contains("--category ai coding"));
        assert!(joined.contains("--ai-line-changes 12"));
        assert!(joined.contains("--human-line-changes -3"));
        assert!(joined.contains("--alternate-project proj"));
        assert!(joined.contains("--project-folder /work/proj"));
        assert!(joined.contains("--write"));
        assert!(joined.contains("--is-unsaved-entity"));
        assert!(joined.contains("--local-file /tmp/snap"));
        assert!(args.last().map(String::as_str) == Some("--extra-heartbeats"));
    }

    #[test]
    fn test_extras_payload_normalizes_category() {
        let mut extra = heartbeat("/c.rs");
        extra.category = None;
        let payload = extras_payload(&[extra]).unwrap();
        assert!(payload.ends_with('\n'));
        let parsed: Vec<Heartbeat> = serde_json::from_str(payload.trim()).unwrap();
        assert_eq!(parsed[0].category, Some(Category::Coding));
    }

    #[test]
    fn test_today_summary_parses_with_missing_fields() {
        let summary: TodaySummary = serde_json::from_str(r#"{"text": "2 hrs 10 mins"}"#).unwrap();
        assert_eq!(summary.text, "2 hrs 10 mins");
        assert!(!summary.has_team_features);
    }

    #[cfg(unix)]
    #[test]
    fn test_dispatch_reports_exit_status() {
        let mut config = reporter().config;
        config.cli_path = PathBuf::from("true");
        let reporter = Reporter::new(config);
        let batch = HeartbeatBatch {
            primary: heartbeat("/a.rs"),
            extras: vec![],
        };
        assert_eq!(reporter.dispatch(&batch).unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_dispatch_spawn_failure() {
        let mut config = reporter().config;
        config.cli_path = PathBuf::from("/nonexistent/reporting-cli");
        let reporter = Reporter::new(config);
        let batch = HeartbeatBatch {
            primary: heartbeat("/a.rs"),
            extras: vec![],
        };
        assert!(matches!(
            reporter.dispatch(&batch),
            Err(ReporterError::Spawn { .. })
        ));
    }
}
