//! Per-file line-count deltas, bucketed by who was editing.
//!
//! Each observation compares a file's current total line count against the
//! last observed baseline and charges the signed difference to the "ai" or
//! "human" bucket, depending on which mode was active at observation time.
//! Buckets accumulate until a heartbeat is constructed, then both maps are
//! cleared wholesale (all files, not just the reported one — see DESIGN.md).

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct LineCountTracker {
    /// Last observed total line count per file. Survives bucket clears.
    baselines: HashMap<String, i64>,
    ai: HashMap<String, i64>,
    human: HashMap<String, i64>,
}

impl LineCountTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current total line count for `file`. The first observation
    /// seeds the baseline with a zero delta.
    pub fn observe(&mut self, file: &str, line_count: i64, ai_active: bool) {
        let prev = *self
            .baselines
            .entry(file.to_string())
            .or_insert(line_count);
        let delta = line_count - prev;

        let bucket = if ai_active { &mut self.ai } else { &mut self.human };
        *bucket.entry(file.to_string()).or_insert(0) += delta;

        self.baselines.insert(file.to_string(), line_count);
    }

    /// Nonzero accumulated deltas for `file` as `(ai, human)`, clearing both
    /// bucket maps for every file. Baselines are kept.
    pub fn take(&mut self, file: &str) -> (Option<i64>, Option<i64>) {
        let ai = self.ai.get(file).copied().filter(|d| *d != 0);
        let human = self.human.get(file).copied().filter(|d| *d != 0);
        self.ai = HashMap::new();
        self.human = HashMap::new();
        (ai, human)
    }

    pub fn ai_delta(&self, file: &str) -> i64 {
        self.ai.get(file).copied().unwrap_or(0)
    }

    pub fn human_delta(&self, file: &str) -> i64 {
        self.human.get(file).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_seeds_zero_delta() {
        let mut counts = LineCountTracker::new();
        counts.observe("a.rs", 100, false);
        assert_eq!(counts.human_delta("a.rs"), 0);
        assert_eq!(counts.ai_delta("a.rs"), 0);
    }

    #[test]
    fn test_deltas_bucket_by_active_mode() {
        let mut counts = LineCountTracker::new();
        counts.observe("a.rs", 100, false);
        counts.observe("a.rs", 105, false);
        counts.observe("a.rs", 103, true);
        assert_eq!(counts.human_delta("a.rs"), 5);
        assert_eq!(counts.ai_delta("a.rs"), -2);
    }

    #[test]
    fn test_take_returns_nonzero_and_clears_all_files() {
        let mut counts = LineCountTracker::new();
        counts.observe("a.rs", 100, false);
        counts.observe("a.rs", 105, false);
        counts.observe("b.rs", 40, true);
        counts.observe("b.rs", 43, true);

        let (ai, human) = counts.take("a.rs");
        assert_eq!(ai, None);
        assert_eq!(human, Some(5));

        // b.rs was never reported but its bucket is gone too.
        assert_eq!(counts.ai_delta("b.rs"), 0);
        assert_eq!(counts.human_delta("b.rs"), 0);
    }

    #[test]
    fn test_baseline_survives_take() {
        let mut counts = LineCountTracker::new();
        counts.observe("a.rs", 100, false);
        counts.observe("a.rs", 110, false);
        counts.take("a.rs");
        counts.observe("a.rs", 112, false);
        assert_eq!(counts.human_delta("a.rs"), 2);
    }

    #[test]
    fn test_zero_delta_reported_as_absent() {
        let mut counts = LineCountTracker::new();
        counts.observe("a.rs", 100, true);
        counts.observe("a.rs", 103, true);
        counts.observe("a.rs", 100, true);
        let (ai, human) = counts.take("a.rs");
        assert_eq!(ai, None);
        assert_eq!(human, None);
    }
}
