//! docsift: local file analysis pipeline
//!
//! Discovered files go into a priority work queue and a pausable orchestrator
//! runs them one at a time through text extraction or vision analysis, LLM
//! tagging and description, and a confidence gate. Results land in SQLite,
//! keyed by content hash so identical files are analyzed once.

pub mod config;
pub mod discovery;
pub mod error;
pub mod hashing;
pub mod processing;
pub mod providers;
pub mod queue;
pub mod server;
pub mod storage;
pub mod types;

pub use config::DocsiftConfig;
pub use error::{Error, Result};
pub use processing::{ControlAction, Orchestrator, ProcessingEvent, RunState};
pub use queue::QueueManager;
pub use types::{FileKind, ProcessingOutcome, QueueItem};
