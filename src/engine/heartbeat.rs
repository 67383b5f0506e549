//! Heartbeat records and dispatch batches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Activity classification attached to a heartbeat. Always populated before
/// dispatch; the backend must never see an unset category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "coding")]
    Coding,
    #[serde(rename = "ai coding")]
    AiCoding,
    #[serde(rename = "debugging")]
    Debugging,
    #[serde(rename = "building")]
    Building,
    #[serde(rename = "code reviewing")]
    CodeReviewing,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Coding => "coding",
            Category::AiCoding => "ai coding",
            Category::Debugging => "debugging",
            Category::Building => "building",
            Category::CodeReviewing => "code reviewing",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation of coding activity, as handed to the reporting CLI.
///
/// The serialized form is the wire format for extra heartbeats streamed on
/// the CLI's standard input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub entity: String,
    /// Unix timestamp in float seconds.
    pub time: f64,
    pub is_write: bool,
    /// One-based line number of the cursor.
    pub lineno: u32,
    /// One-based cursor column.
    pub cursorpos: u32,
    pub lines_in_file: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate_project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_folder: Option<String>,
    /// Accumulated line-count delta attributed to AI since the previous
    /// heartbeat for this file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_line_changes: Option<i64>,
    /// Accumulated line-count delta attributed to the user since the
    /// previous heartbeat for this file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_line_changes: Option<i64>,
    /// Local snapshot path for remote entities, deleted after dispatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_unsaved_entity: Option<bool>,
}

impl Heartbeat {
    pub fn category_or_default(&self) -> Category {
        self.category.unwrap_or(Category::Coding)
    }
}

/// Unix float seconds for a heartbeat timestamp.
pub fn unix_seconds(now: DateTime<Utc>) -> f64 {
    now.timestamp_millis() as f64 / 1000.0
}

/// One drained dispatch: the first queued heartbeat is the primary, the rest
/// travel as extras on the CLI's standard input.
#[derive(Debug, Clone)]
pub struct HeartbeatBatch {
    pub primary: Heartbeat,
    pub extras: Vec<Heartbeat>,
}

impl HeartbeatBatch {
    pub fn len(&self) -> usize {
        1 + self.extras.len()
    }

    /// Temp-file snapshots carried by this batch, for cleanup after the
    /// dispatch completes.
    pub fn temp_files(&self) -> Vec<&str> {
        std::iter::once(&self.primary)
            .chain(self.extras.iter())
            .filter_map(|h| h.local_file.as_deref())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_category_wire_names() {
        assert_eq!(
            serde_json::to_string(&Category::AiCoding).unwrap(),
            "\"ai coding\""
        );
        assert_eq!(
            serde_json::to_string(&Category::CodeReviewing).unwrap(),
            "\"code reviewing\""
        );
    }

    #[test]
    fn test_unix_seconds_keeps_millis() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_250).unwrap();
        assert!((unix_seconds(now) - 1_700_000_000.25).abs() < 1e-9);
    }

    #[test]
    fn test_optional_fields_omitted_from_wire_format() {
        let hb = Heartbeat {
            entity: "/a.rs".to_string(),
            time: 1.5,
            is_write: false,
            lineno: 1,
            cursorpos: 1,
            lines_in_file: 10,
            category: Some(Category::Coding),
            alternate_project: None,
            project_folder: None,
            ai_line_changes: None,
            human_line_changes: None,
            local_file: None,
            is_unsaved_entity: None,
        };
        let json = serde_json::to_string(&hb).unwrap();
        assert!(!json.contains("alternate_project"));
        assert!(!json.contains("ai_line_changes"));
        assert!(json.contains("\"category\":\"coding\""));
    }

    #[test]
    fn test_batch_temp_files() {
        let mut primary = Heartbeat {
            entity: "remote://a.rs".to_string(),
            time: 1.0,
            is_write: true,
            lineno: 1,
            cursorpos: 1,
            lines_in_file: 3,
            category: Some(Category::Coding),
            alternate_project: None,
            project_folder: None,
            ai_line_changes: None,
            human_line_changes: None,
            local_file: Some("/tmp/snap-1".to_string()),
            is_unsaved_entity: None,
        };
        let extra = primary.clone();
        primary.local_file = Some("/tmp/snap-0".to_string());
        let batch = HeartbeatBatch {
            primary,
            extras: vec![extra],
        };
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.temp_files(), vec!["/tmp/snap-0", "/tmp/snap-1"]);
    }
}
