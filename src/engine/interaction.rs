//! Per-file record of the most recent deliberate user interaction.
//!
//! Cursor movement, selection, and single-character typing count as
//! interaction. Tab and focus switches never do: they say where the user is
//! looking, not that they touched the file.

use crate::engine::{INTERACTION_NEAR_LINES, RECENT_INTERACTION_MS};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// The last deliberate interaction in one file.
#[derive(Debug, Clone, Copy)]
pub struct InteractionRecord {
    pub time: DateTime<Utc>,
    pub line: u32,
    pub line_end: u32,
}

/// Per-file interaction records, overwritten on every qualifying
/// interaction and kept for the process lifetime.
#[derive(Debug, Default)]
pub struct InteractionTracker {
    records: HashMap<String, InteractionRecord>,
}

impl InteractionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally overwrite the record for `file`.
    pub fn record(&mut self, file: &str, line: u32, line_end: u32, now: DateTime<Utc>) {
        self.records.insert(
            file.to_string(),
            InteractionRecord {
                time: now,
                line,
                line_end,
            },
        );
    }

    /// True when the user interacted with `file` within the recency window
    /// and, if `change_line` is given, the change is on or within
    /// [`INTERACTION_NEAR_LINES`] lines of the recorded range.
    pub fn had_recent(&self, file: &str, change_line: Option<u32>, now: DateTime<Utc>) -> bool {
        let Some(record) = self.records.get(file) else {
            return false;
        };
        if (now - record.time).num_milliseconds() > RECENT_INTERACTION_MS {
            return false;
        }
        if let Some(line) = change_line {
            let min_line = record.line.saturating_sub(INTERACTION_NEAR_LINES);
            let max_line = record.line_end + INTERACTION_NEAR_LINES;
            if line < min_line || line > max_line {
                return false;
            }
        }
        true
    }

    #[cfg(test)]
    pub(crate) fn get(&self, file: &str) -> Option<&InteractionRecord> {
        self.records.get(file)
    }
}
