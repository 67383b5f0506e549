//! Host-editor interface: the event stream and document model the agent
//! consumes. Event production itself lives in the host editor.

pub mod types;

pub use types::{
    Caret, ContentChange, Document, DocumentKind, EditorEvent, EventKind, Focus, SelectionEvent,
    TextChangeEvent,
};
