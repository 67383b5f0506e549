//! Host-editor event types consumed by the activity engine.
//!
//! The host editor resolves document identity (canonical path, remote or
//! untitled markers, enclosing project) and streams these records to the
//! agent as line-delimited JSON. The agent never talks to the editor
//! directly; everything it knows about a document arrives on one of these
//! events.

use serde::{Deserialize, Serialize};

/// How the host resolved a document's backing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// A file on the local filesystem.
    Local,
    /// A remote document; `Document::text` carries its content so the agent
    /// can snapshot it to a local temp file for the reporting CLI.
    Remote,
    /// An unsaved, never-persisted buffer.
    Untitled,
}

impl Default for DocumentKind {
    fn default() -> Self {
        DocumentKind::Local
    }
}

/// A document as resolved by the host editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Canonical entity path (local path, remote marker, or untitled marker).
    pub path: String,
    #[serde(default)]
    pub kind: DocumentKind,
    /// Total lines in the document after the event.
    pub line_count: u32,
    /// Project name, when the host could determine one.
    #[serde(default)]
    pub project: Option<String>,
    /// Enclosing project folder path.
    #[serde(default)]
    pub project_folder: Option<String>,
    /// True for AI-chat sidebar surfaces. Chat surfaces have no heartbeat
    /// entity.
    #[serde(default)]
    pub chat_surface: bool,
    /// True when the document is a pull-request review surface.
    #[serde(default)]
    pub pull_request: bool,
    /// Full text, supplied for remote documents only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Document {
    /// The heartbeat entity for this document, or `None` for surfaces that
    /// never produce heartbeats (chat sidebars).
    pub fn entity(&self) -> Option<&str> {
        if self.chat_surface {
            None
        } else {
            Some(&self.path)
        }
    }

    pub fn is_remote(&self) -> bool {
        self.kind == DocumentKind::Remote
    }

    pub fn is_untitled(&self) -> bool {
        self.kind == DocumentKind::Untitled
    }
}

/// Zero-based cursor position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caret {
    pub line: u32,
    pub column: u32,
}

/// The focused document and cursor at the time an event fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Focus {
    pub document: Document,
    #[serde(default)]
    pub caret: Caret,
}

/// One contiguous replaced region within a text change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentChange {
    /// First line of the replaced range (zero-based).
    pub start_line: u32,
    /// Last line of the replaced range (zero-based).
    pub end_line: u32,
    /// Characters inserted.
    #[serde(default)]
    pub inserted: usize,
    /// Characters removed (length of the replaced range).
    #[serde(default)]
    pub removed: usize,
    /// Newlines contained in the inserted text.
    #[serde(default)]
    pub inserted_newlines: u32,
}

/// A document edit: the changed document plus its content changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChangeEvent {
    pub document: Document,
    pub changes: Vec<ContentChange>,
}

impl TextChangeEvent {
    /// First line where the change happened (min of all change start lines).
    pub fn start_line(&self) -> u32 {
        self.changes.iter().map(|c| c.start_line).min().unwrap_or(0)
    }

    /// Last line touched by the change (max of all change end lines).
    pub fn end_line(&self) -> u32 {
        self.changes.iter().map(|c| c.end_line).max().unwrap_or(0)
    }

    /// Total characters inserted across all content changes.
    pub fn total_inserted(&self) -> usize {
        self.changes.iter().map(|c| c.inserted).sum()
    }
}

/// A cursor or selection movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionEvent {
    pub document: Document,
    /// First line of the primary selection (zero-based).
    #[serde(default)]
    pub start_line: u32,
    /// Last line of the primary selection (zero-based).
    #[serde(default)]
    pub end_line: u32,
    /// True when the selection was moved by a command rather than the user.
    #[serde(default)]
    pub command: bool,
}

/// The event stream delivered by the host editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    Selection(SelectionEvent),
    TextChange(TextChangeEvent),
    /// The active editor changed.
    TabChange,
    /// The set of open tabs changed.
    TabsChanged,
    Save,
    NotebookChange,
    NotebookSave,
    TaskStart {
        #[serde(default)]
        is_background: bool,
        #[serde(default)]
        detail: Option<String>,
    },
    TaskEnd,
    DebugStart,
    DebugEnd,
    /// Active debug session or breakpoints changed.
    DebugChange,
}

/// One record on the agent's event input: the focus context at event time
/// plus the event itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorEvent {
    #[serde(default)]
    pub focus: Option<Focus>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl EditorEvent {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match &self.kind {
            EventKind::Selection(_) => "selection",
            EventKind::TextChange(_) => "text_change",
            EventKind::TabChange => "tab_change",
            EventKind::TabsChanged => "tabs_changed",
            EventKind::Save => "save",
            EventKind::NotebookChange => "notebook_change",
            EventKind::NotebookSave => "notebook_save",
            EventKind::TaskStart { .. } => "task_start",
            EventKind::TaskEnd => "task_end",
            EventKind::DebugStart => "debug_start",
            EventKind::DebugEnd => "debug_end",
            EventKind::DebugChange => "debug_change",
        }
    }
}
