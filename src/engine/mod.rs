//! Activity classification and heartbeat buffering engine.
//!
//! ```text
//! editor event ──▶ debounce ──▶ classify ──▶ line deltas ──▶ append ──▶ queue
//!                                                                        │
//!                                              flush (≤ every 30 s) ◀────┘
//! ```
//!
//! Everything here runs on one logical thread. Timers are deadlines polled
//! by the event loop ([`ActivityEngine::poll`]); a drained batch is owned by
//! its dispatch and never touched again by the engine.

pub mod classifier;
pub mod heartbeat;
pub mod interaction;
pub mod line_counts;
pub mod timer;

pub use classifier::{classify, ChangeSource, Classification, SessionState};
pub use heartbeat::{unix_seconds, Category, Heartbeat, HeartbeatBatch};
pub use interaction::{InteractionRecord, InteractionTracker};
pub use line_counts::LineCountTracker;
pub use timer::DebounceTimer;

use crate::activity_log::ActivityLog;
use crate::editor::{Caret, Document, EditorEvent, EventKind, Focus, TextChangeEvent};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, error, warn};

/// A paste following a click/selection/keystroke within this window counts
/// as human.
pub const RECENT_INTERACTION_MS: i64 = 10_000;
/// A change counts as near an interaction when within this many lines of
/// the recorded range.
pub const INTERACTION_NEAR_LINES: u32 = 2;
/// Minimum interval between non-forced heartbeats for the same file.
pub const TIME_BETWEEN_HEARTBEATS_MS: i64 = 120_000;
/// Maximum buffering interval before queued heartbeats are dispatched.
pub const SEND_BUFFER_MS: i64 = 30_000;
/// Trailing-edge delay coalescing event bursts into one append decision.
pub const EVENT_DEBOUNCE_MS: i64 = 50;
/// Delay before sustained keystrokes clear the ai-generating flag.
pub const AI_DEBOUNCE_MS: i64 = 1_000;
/// Forced-write heartbeats at an unchanged cursor position are suppressed
/// within this window.
pub const DEDUP_WINDOW_MS: i64 = 30 * 60_000;
/// Credential re-prompts are throttled to once per this interval.
pub const API_KEY_PROMPT_INTERVAL_MS: i64 = 86_400_000;
/// Single-line inserts at or above this size count as bulk.
pub const BULK_INSERT_MIN_CHARS: usize = 100;

/// User-visible surfacing directives produced by the engine. Rendering them
/// is the embedder's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The collaborator accepted the batch.
    Synced,
    /// Collaborator currently unreachable; queued on its side for later.
    Offline { code: i32 },
    /// Local configuration could not be parsed by the collaborator.
    ConfigParseError,
    /// Credentials rejected; `prompt_api_key` is throttled to once per 24 h.
    AuthRejected { prompt_api_key: bool },
    /// Unclassified collaborator failure.
    DispatchFailed { code: i32 },
    /// A flush was due but no api key is configured; the queue is retained.
    ApiKeyMissing,
}

/// What one engine call produced: at most one batch to dispatch, plus any
/// surfacing directives.
#[derive(Debug, Default)]
pub struct EngineOutput {
    pub batch: Option<HeartbeatBatch>,
    pub notices: Vec<StatusUpdate>,
}

#[derive(Debug, Clone, Copy)]
struct DedupEntry {
    line: u32,
    column: u32,
    last_heartbeat_at: DateTime<Utc>,
}

/// Append decision captured at event time; the most recent event in a
/// debounce window wins.
#[derive(Debug)]
struct PendingAppend {
    forced: bool,
    focus: Option<Focus>,
    /// For ai-classified changes: the edited document, since focus is often
    /// in the chat surface and would drop the heartbeat.
    doc_override: Option<Document>,
    ai_generating: bool,
    compiling: bool,
    debugging: bool,
}

pub struct ActivityEngine {
    session: SessionState,
    interactions: InteractionTracker,
    line_counts: LineCountTracker,
    dedupe: HashMap<String, DedupEntry>,
    queue: VecDeque<Heartbeat>,

    append_debounce: DebounceTimer,
    pending: Option<PendingAppend>,
    ai_debounce: DebounceTimer,

    last_file: Option<String>,
    last_heartbeat_at: Option<DateTime<Utc>>,
    last_debugging: bool,
    last_compiling: bool,
    last_ai_generating: bool,

    last_sent_at: Option<DateTime<Utc>>,
    last_api_key_prompted: Option<DateTime<Utc>>,
    has_api_key: bool,

    activity_log: Option<ActivityLog>,
}

impl ActivityEngine {
    pub fn new(ai_capabilities: bool, has_api_key: bool) -> Self {
        Self {
            session: SessionState::new(ai_capabilities),
            interactions: InteractionTracker::new(),
            line_counts: LineCountTracker::new(),
            dedupe: HashMap::new(),
            queue: VecDeque::new(),
            append_debounce: DebounceTimer::new(),
            pending: None,
            ai_debounce: DebounceTimer::new(),
            last_file: None,
            last_heartbeat_at: None,
            last_debugging: false,
            last_compiling: false,
            last_ai_generating: false,
            last_sent_at: None,
            last_api_key_prompted: None,
            has_api_key,
            activity_log: None,
        }
    }

    pub fn with_activity_log(mut self, log: ActivityLog) -> Self {
        self.activity_log = Some(log);
        self
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Earliest pending timer deadline, for the event loop's wait.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        match (
            self.append_debounce.next_deadline(),
            self.ai_debounce.next_deadline(),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Process one host-editor event.
    pub fn handle_event(&mut self, event: EditorEvent, now: DateTime<Utc>) -> EngineOutput {
        debug!(event = event.name(), "editor event");
        let mut out = EngineOutput::default();
        let focus = event.focus;

        match event.kind {
            EventKind::Selection(sel) => {
                if sel.command {
                    return out;
                }
                if sel.document.chat_surface {
                    self.session.ai_generating = true;
                } else {
                    self.interactions
                        .record(&sel.document.path, sel.start_line, sel.end_line, now);
                }
                self.observe_lines(&focus);
                self.on_event(false, focus, now, &mut out);
            }
            EventKind::TextChange(change) => {
                let cls = classify(
                    &change,
                    &mut self.session,
                    &mut self.interactions,
                    &mut self.ai_debounce,
                    now,
                );
                if cls.observe_lines {
                    self.observe_lines(&focus);
                }
                self.log_change(&change, cls.source, now);

                if self.session.ai_generating && cls.ai_code_change {
                    // Append immediately for the edited document; waiting on
                    // the debounce would hand the decision to whatever is
                    // focused, usually the chat surface.
                    self.on_event_immediate(true, focus, Some(change.document), now, &mut out);
                } else {
                    self.on_event(false, focus, now, &mut out);
                }
            }
            EventKind::TabChange => {
                self.session.ai_generating = false;
                self.observe_lines(&focus);
                self.on_event(false, focus, now, &mut out);
            }
            EventKind::TabsChanged => {
                if !self.session.ai_generating {
                    return out;
                }
                self.observe_lines(&focus);
                self.on_event(false, focus, now, &mut out);
            }
            EventKind::Save | EventKind::NotebookSave => {
                self.observe_lines(&focus);
                self.on_event_immediate(true, focus, None, now, &mut out);
            }
            EventKind::NotebookChange => {
                self.observe_lines(&focus);
                self.on_event(false, focus, now, &mut out);
            }
            EventKind::TaskStart {
                is_background,
                detail,
            } => {
                if is_background || detail.as_deref().is_some_and(|d| d.contains("watch")) {
                    return out;
                }
                self.session.compiling = true;
                self.session.ai_generating = false;
                self.observe_lines(&focus);
                self.on_event(false, focus, now, &mut out);
            }
            EventKind::TaskEnd => {
                self.session.compiling = false;
                self.observe_lines(&focus);
                self.on_event(false, focus, now, &mut out);
            }
            EventKind::DebugStart => {
                self.session.debugging = true;
                self.session.ai_generating = false;
                self.observe_lines(&focus);
                self.on_event(false, focus, now, &mut out);
            }
            EventKind::DebugEnd => {
                self.session.debugging = false;
                self.observe_lines(&focus);
                self.on_event(false, focus, now, &mut out);
            }
            EventKind::DebugChange => {
                self.observe_lines(&focus);
                self.on_event(false, focus, now, &mut out);
            }
        }

        out
    }

    /// Fire any due timers. Called by the event loop whenever the deadline
    /// from [`next_deadline`](Self::next_deadline) passes.
    pub fn poll(&mut self, now: DateTime<Utc>) -> EngineOutput {
        let mut out = EngineOutput::default();

        if self.ai_debounce.take_due(now) && self.session.ai_debounce_count > 1 {
            // Sustained keystrokes disproved the generation pass.
            self.session.ai_generating = false;
        }

        if self.append_debounce.take_due(now) {
            if let Some(pending) = self.pending.take() {
                self.append_decision(pending, now, &mut out);
            }
        }

        out
    }

    /// Final flush, regardless of the buffering interval. Called on
    /// shutdown.
    pub fn shutdown(&mut self, now: DateTime<Utc>) -> EngineOutput {
        let mut out = EngineOutput::default();
        self.flush(now, &mut out);
        out
    }

    /// Interpret the collaborator's completion status for a dispatched
    /// batch.
    pub fn handle_outcome(&mut self, code: i32, now: DateTime<Utc>) -> Vec<StatusUpdate> {
        match code {
            0 => vec![StatusUpdate::Synced],
            102 | 112 => {
                warn!(code, "collaborator offline; activity will sync when back online");
                vec![StatusUpdate::Offline { code }]
            }
            103 => {
                error!("collaborator reported a config parsing error (103)");
                vec![StatusUpdate::ConfigParseError]
            }
            104 => {
                error!("collaborator rejected the api key (104)");
                let prompt = self
                    .last_api_key_prompted
                    .map_or(true, |t| (now - t).num_milliseconds() > API_KEY_PROMPT_INTERVAL_MS);
                if prompt {
                    self.last_api_key_prompted = Some(now);
                }
                vec![StatusUpdate::AuthRejected {
                    prompt_api_key: prompt,
                }]
            }
            code => {
                error!(code, "collaborator failed with an unclassified status");
                vec![StatusUpdate::DispatchFailed { code }]
            }
        }
    }

    fn observe_lines(&mut self, focus: &Option<Focus>) {
        let Some(focus) = focus else { return };
        let Some(file) = focus.document.entity() else {
            return;
        };
        self.line_counts.observe(
            file,
            i64::from(focus.document.line_count),
            self.session.ai_generating,
        );
    }

    /// Schedule the trailing-edge append decision, superseding any pending
    /// one.
    fn on_event(
        &mut self,
        forced: bool,
        focus: Option<Focus>,
        now: DateTime<Utc>,
        out: &mut EngineOutput,
    ) {
        self.flush_if_due(now, out);
        self.pending = Some(self.pending_append(forced, focus, None));
        self.append_debounce.arm(now, EVENT_DEBOUNCE_MS);
    }

    /// Run the append decision now, cancelling any pending debounced one.
    /// Used for saves and ai-classified changes.
    fn on_event_immediate(
        &mut self,
        forced: bool,
        focus: Option<Focus>,
        doc_override: Option<Document>,
        now: DateTime<Utc>,
        out: &mut EngineOutput,
    ) {
        self.flush_if_due(now, out);
        self.append_debounce.cancel();
        self.pending = None;
        let pending = self.pending_append(forced, focus, doc_override);
        self.append_decision(pending, now, out);
    }

    fn pending_append(
        &self,
        forced: bool,
        focus: Option<Focus>,
        doc_override: Option<Document>,
    ) -> PendingAppend {
        PendingAppend {
            forced,
            focus,
            doc_override,
            ai_generating: self.session.ai_generating,
            compiling: self.session.compiling,
            debugging: self.session.debugging,
        }
    }

    fn append_decision(&mut self, pending: PendingAppend, now: DateTime<Utc>, out: &mut EngineOutput) {
        let (doc, caret) = match (&pending.doc_override, &pending.focus) {
            (Some(doc), _) => (doc.clone(), Caret::default()),
            (None, Some(focus)) => (focus.document.clone(), focus.caret),
            (None, None) => return,
        };
        let Some(file) = doc.entity().map(str::to_string) else {
            return;
        };

        let due = pending.forced
            || self
                .last_heartbeat_at
                .map_or(true, |t| (now - t).num_milliseconds() > TIME_BETWEEN_HEARTBEATS_MS)
            || self.last_file.as_deref() != Some(file.as_str())
            || self.last_debugging != pending.debugging
            || self.last_compiling != pending.compiling
            || self.last_ai_generating != pending.ai_generating;
        if !due {
            return;
        }

        self.append_heartbeat(&doc, caret, &pending, &file, now, out);

        self.last_file = Some(file);
        self.last_heartbeat_at = Some(now);
        self.last_debugging = pending.debugging;
        self.last_compiling = pending.compiling;
        self.last_ai_generating = pending.ai_generating;
    }

    fn append_heartbeat(
        &mut self,
        doc: &Document,
        caret: Caret,
        pending: &PendingAppend,
        file: &str,
        now: DateTime<Utc>,
        out: &mut EngineOutput,
    ) {
        if pending.forced && self.is_duplicate(file, caret, now) {
            debug!(file, "suppressing duplicate heartbeat");
            return;
        }

        let (ai_line_changes, human_line_changes) = self.line_counts.take(file);

        let category = if pending.debugging {
            Category::Debugging
        } else if pending.compiling {
            Category::Building
        } else if pending.ai_generating {
            Category::AiCoding
        } else if doc.pull_request {
            Category::CodeReviewing
        } else {
            Category::Coding
        };

        let mut heartbeat = Heartbeat {
            entity: file.to_string(),
            time: unix_seconds(now),
            is_write: pending.forced,
            lineno: caret.line + 1,
            cursorpos: caret.column + 1,
            lines_in_file: doc.line_count,
            category: Some(category),
            alternate_project: doc.project.clone(),
            project_folder: doc.project_folder.clone(),
            ai_line_changes,
            human_line_changes,
            local_file: None,
            is_unsaved_entity: doc.is_untitled().then_some(true),
        };

        if doc.is_remote() {
            match snapshot_remote(doc, now) {
                Ok(Some(path)) => heartbeat.local_file = Some(path),
                Ok(None) => debug!(file, "remote document carried no text; skipping snapshot"),
                Err(e) => debug!(file, error = %e, "remote snapshot failed"),
            }
        }

        debug!(file, category = %category, "appending heartbeat to local buffer");
        if let Some(log) = &self.activity_log {
            log.record(
                now,
                "heartbeat",
                &[
                    ("file", file.to_string()),
                    (
                        "project",
                        heartbeat.alternate_project.clone().unwrap_or_default(),
                    ),
                    ("source", category.as_str().to_string()),
                    ("line", heartbeat.lineno.to_string()),
                    ("lines", heartbeat.lines_in_file.to_string()),
                    ("is_write", u8::from(heartbeat.is_write).to_string()),
                ],
            );
        }
        self.queue.push_back(heartbeat);

        self.flush_if_due(now, out);
    }

    /// True when a forced heartbeat for `file` repeats the previous cursor
    /// position within the dedup window. The entry is refreshed either way.
    fn is_duplicate(&mut self, file: &str, caret: Caret, now: DateTime<Utc>) -> bool {
        let duplicate = self.dedupe.get(file).is_some_and(|entry| {
            (now - entry.last_heartbeat_at).num_milliseconds() < DEDUP_WINDOW_MS
                && entry.line == caret.line
                && entry.column == caret.column
        });
        self.dedupe.insert(
            file.to_string(),
            DedupEntry {
                line: caret.line,
                column: caret.column,
                last_heartbeat_at: now,
            },
        );
        duplicate
    }

    fn flush_if_due(&mut self, now: DateTime<Utc>, out: &mut EngineOutput) {
        let due = self
            .last_sent_at
            .map_or(true, |t| (now - t).num_milliseconds() > SEND_BUFFER_MS);
        if due {
            self.flush(now, out);
        }
    }

    fn flush(&mut self, now: DateTime<Utc>, out: &mut EngineOutput) {
        if self.queue.is_empty() {
            return;
        }
        if !self.has_api_key {
            out.notices.push(StatusUpdate::ApiKeyMissing);
            return;
        }
        let Some(primary) = self.queue.pop_front() else {
            return;
        };
        self.last_sent_at = Some(now);
        let extras: Vec<Heartbeat> = self.queue.drain(..).collect();
        let batch = HeartbeatBatch { primary, extras };

        if let Some(log) = &self.activity_log {
            let all: Vec<&Heartbeat> =
                std::iter::once(&batch.primary).chain(batch.extras.iter()).collect();
            log.record(
                now,
                "send",
                &[
                    (
                        "files",
                        all.iter().map(|h| h.entity.as_str()).collect::<Vec<_>>().join(","),
                    ),
                    (
                        "sources",
                        all.iter()
                            .map(|h| h.category_or_default().as_str())
                            .collect::<Vec<_>>()
                            .join(","),
                    ),
                    (
                        "is_writes",
                        all.iter()
                            .map(|h| if h.is_write { "1" } else { "0" })
                            .collect::<Vec<_>>()
                            .join(","),
                    ),
                    ("count", all.len().to_string()),
                ],
            );
        }

        out.batch = Some(batch);
    }

    fn log_change(&self, change: &TextChangeEvent, source: ChangeSource, now: DateTime<Utc>) {
        let Some(log) = &self.activity_log else { return };
        log.record(
            now,
            "change",
            &[
                ("file", change.document.path.clone()),
                ("project", change.document.project.clone().unwrap_or_default()),
                ("source", source.as_str().to_string()),
                ("line", change.start_line().to_string()),
                ("line_end", change.end_line().to_string()),
                ("lines", change.document.line_count.to_string()),
                ("changes", change.changes.len().to_string()),
                ("chars", change.total_inserted().to_string()),
            ],
        );
    }
}

/// Snapshot a remote document's content to a process-temporary file whose
/// path is passed to the collaborator and deleted once dispatch completes.
fn snapshot_remote(doc: &Document, now: DateTime<Utc>) -> std::io::Result<Option<String>> {
    let Some(text) = &doc.text else {
        return Ok(None);
    };
    let name = format!(
        "codepulse-{}-{}",
        now.timestamp_millis(),
        &uuid::Uuid::new_v4().to_string()[..8]
    );
    let path = std::env::temp_dir().join(name);
    std::fs::write(&path, text)?;
    Ok(Some(path.to_string_lossy().into_owned()))
}
