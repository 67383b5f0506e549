//! Codepulse Agent - editor-activity telemetry with human/AI attribution.
//!
//! The agent observes document-edit events from a host editor, classifies
//! each edit as human- or AI-authored, accumulates per-file line-change
//! statistics, and emits rate-limited heartbeat records to an external
//! reporting CLI.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Codepulse Agent                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌────────────┐   ┌──────────┐   ┌─────────┐  │
//! │  │  Editor  │──▶│ Classifier │──▶│ Heartbeat│──▶│ Reporter│  │
//! │  │  events  │   │ (human/ai) │   │  buffer  │   │  (CLI)  │  │
//! │  └──────────┘   └────────────┘   └──────────┘   └─────────┘  │
//! │        │               │                                     │
//! │        ▼               ▼                                     │
//! │  ┌──────────┐   ┌────────────┐                               │
//! │  │ Activity │   │ Line-delta │                               │
//! │  │   log    │   │  buckets   │                               │
//! │  └──────────┘   └────────────┘                               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events arrive as line-delimited JSON on standard input; see
//! [`editor::EditorEvent`] for the record format. All engine state is owned
//! by one logical thread; dispatches to the reporting CLI run on worker
//! threads and report their completion status back to that thread.
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use codepulse_agent::engine::ActivityEngine;
//!
//! let mut engine = ActivityEngine::new(true, true);
//! # let event: codepulse_agent::editor::EditorEvent = todo!();
//! let output = engine.handle_event(event, Utc::now());
//! if let Some(batch) = output.batch {
//!     // hand the batch to a Reporter
//! }
//! ```

pub mod activity_log;
pub mod config;
pub mod editor;
pub mod engine;
pub mod reporter;

// Re-export key types at crate root for convenience
pub use activity_log::ActivityLog;
pub use config::{Config, ConfigError};
pub use editor::{Document, EditorEvent, EventKind};
pub use engine::{
    ActivityEngine, Category, EngineOutput, Heartbeat, HeartbeatBatch, SessionState, StatusUpdate,
};
pub use reporter::{Reporter, ReporterConfig, ReporterError, TodaySummary};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
