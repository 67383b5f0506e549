//! Append-only activity log.
//!
//! One line per record: timestamp, record name, `key=value` pairs. Values
//! containing spaces are quoted. Writes are best-effort; a failing log file
//! must never disturb event processing.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Empty values are skipped.
    pub fn record(&self, now: DateTime<Utc>, name: &str, fields: &[(&str, String)]) {
        let ts = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut line = format!("{ts}  [codepulse]  {name}");
        for (key, value) in fields {
            if value.is_empty() {
                continue;
            }
            line.push_str("  ");
            line.push_str(key);
            line.push('=');
            line.push_str(&quote(value));
        }
        line.push('\n');

        if let Err(e) = self.append(&line) {
            debug!(path = %self.path.display(), error = %e, "activity log write failed");
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

fn quote(value: &str) -> String {
    if value.contains(' ') {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_format() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path().join("activity.log"));
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        log.record(
            now,
            "change",
            &[
                ("file", "/a.rs".to_string()),
                ("project", "my project".to_string()),
                ("source", "human".to_string()),
                ("skipped", String::new()),
            ],
        );

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert!(contents.contains("[codepulse]  change"));
        assert!(contents.contains("file=/a.rs"));
        assert!(contents.contains("project=\"my project\""));
        assert!(!contents.contains("skipped="));
        assert!(contents.ends_with('\n'));
    }

    #[test]
    fn test_records_append() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path().join("activity.log"));
        let now = Utc.timestamp_millis_opt(0).unwrap();
        log.record(now, "heartbeat", &[("file", "/a.rs".to_string())]);
        log.record(now, "send", &[("count", "2".to_string())]);
        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
