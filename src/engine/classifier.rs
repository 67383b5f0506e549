//! Human/AI attribution for document edits.
//!
//! The heuristic works from three signals, checked in a fixed order: edits in
//! an AI-chat surface are unambiguously AI; single-character edits are the
//! strongest human signal (bulk AI insertion is never one character); for
//! everything else, a recent cursor/selection/typing interaction near the
//! changed line is the deciding evidence. Proximity is measured in lines
//! because the editor reports cursor position at line granularity relative to
//! typing bursts.

use crate::editor::TextChangeEvent;
use crate::engine::interaction::InteractionTracker;
use crate::engine::timer::DebounceTimer;
use crate::engine::{AI_DEBOUNCE_MS, BULK_INSERT_MIN_CHARS};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Who produced a change. The "unknown" intermediate state is always
/// normalized to human before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    Human,
    Ai,
}

impl ChangeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeSource::Human => "human",
            ChangeSource::Ai => "ai",
        }
    }
}

/// Process-wide session flags, owned by the engine and passed by reference.
#[derive(Debug)]
pub struct SessionState {
    /// An AI generation pass appears to be in progress.
    pub ai_generating: bool,
    /// Single-character edits observed while `ai_generating`; sustained
    /// keystroke activity disproves ongoing generation.
    pub ai_debounce_count: u32,
    pub compiling: bool,
    pub debugging: bool,
    /// Whether the host has any AI generation surface. Fixed at init.
    pub ai_capabilities: bool,
}

impl SessionState {
    pub fn new(ai_capabilities: bool) -> Self {
        Self {
            ai_generating: false,
            ai_debounce_count: 0,
            compiling: false,
            debugging: false,
            ai_capabilities,
        }
    }
}

/// Outcome of classifying one edit.
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub source: ChangeSource,
    /// True when this specific change was attributed to AI; triggers an
    /// immediate heartbeat append for the changed document.
    pub ai_code_change: bool,
    /// True when the engine should observe the focused document's line count
    /// as part of handling this change.
    pub observe_lines: bool,
}

impl Classification {
    fn human() -> Self {
        Self {
            source: ChangeSource::Human,
            ai_code_change: false,
            observe_lines: false,
        }
    }

    fn ai(observe_lines: bool) -> Self {
        Self {
            source: ChangeSource::Ai,
            ai_code_change: true,
            observe_lines,
        }
    }
}

/// Single-character insert or single-character delete, the shape of ordinary
/// typing.
pub fn is_single_char_edit(change: &TextChangeEvent) -> bool {
    if change.changes.len() != 1 {
        return false;
    }
    let c = &change.changes[0];
    (c.inserted == 1 && c.removed == 0) || (c.inserted == 0 && c.removed == 1)
}

/// Multi-line or bulk-paste insert, the shape of generated code.
pub fn is_bulk_insert(change: &TextChangeEvent) -> bool {
    change.changes.iter().any(|c| c.inserted_newlines > 0)
        || change.total_inserted() >= BULK_INSERT_MIN_CHARS
}

/// Classify one edit, with side effects on the session flags, the
/// interaction tracker, and the AI debounce timer.
///
/// Decision order, first match wins: chat surface, single-character edit,
/// bulk insert, everything else.
pub fn classify(
    change: &TextChangeEvent,
    session: &mut SessionState,
    interactions: &mut InteractionTracker,
    ai_debounce: &mut DebounceTimer,
    now: DateTime<Utc>,
) -> Classification {
    let file = change.document.path.as_str();
    let change_line = change.start_line();

    let classification = if change.document.chat_surface {
        session.ai_generating = true;
        session.ai_debounce_count = 0;
        Classification::ai(false)
    } else if is_single_char_edit(change) {
        // Typing counts as interaction; tab/focus switches do not.
        interactions.record(file, change_line, change_line, now);
        if session.ai_generating {
            // An isolated keystroke while AI is "generating" is ambiguous;
            // only repeated keystrokes clear the flag, once the timer fires.
            session.ai_debounce_count += 1;
            ai_debounce.arm(now, AI_DEBOUNCE_MS);
        }
        Classification::human()
    } else if is_bulk_insert(change) {
        if interactions.had_recent(file, Some(change_line), now) {
            interactions.record(file, change_line, change_line, now);
            Classification::human()
        } else if session.ai_capabilities {
            session.ai_generating = true;
            session.ai_debounce_count = 0;
            Classification::ai(false)
        } else {
            // No attribution evidence exists without AI capability.
            interactions.record(file, change_line, change_line, now);
            Classification::human()
        }
    } else if interactions.had_recent(file, Some(change_line), now) {
        interactions.record(file, change_line, change_line, now);
        Classification::human()
    } else if session.ai_generating {
        session.ai_debounce_count = 0;
        ai_debounce.cancel();
        Classification::ai(true)
    } else if session.ai_capabilities {
        session.ai_generating = true;
        session.ai_debounce_count = 0;
        Classification::ai(true)
    } else {
        Classification::human()
    };

    debug!(
        file,
        line = change_line,
        source = classification.source.as_str(),
        "classified change"
    );
    classification
}
