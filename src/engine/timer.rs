//! Cancellable trailing-edge timer.
//!
//! The engine runs on one logical thread, so timers are plain deadlines
//! polled by the event loop rather than background threads. Arming a timer
//! replaces any pending deadline, which gives the cancel-and-reschedule
//! semantics the debouncers need.

use chrono::{DateTime, Duration, Utc};

/// A single-purpose deadline. At most one instance is pending at a time.
#[derive(Debug, Default)]
pub struct DebounceTimer {
    deadline: Option<DateTime<Utc>>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self { deadline: None }
    }

    /// Arm (or re-arm) the timer `delay_ms` from `now`, cancelling any
    /// pending deadline.
    pub fn arm(&mut self, now: DateTime<Utc>, delay_ms: i64) {
        self.deadline = Some(now + Duration::milliseconds(delay_ms));
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// The pending deadline, for the event loop's wait calculation.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Returns true (and disarms) when the deadline has passed.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
