//! Core types for docsift

pub mod file_kind;
pub mod outcome;
pub mod queue_item;

pub use file_kind::FileKind;
pub use outcome::{Description, ExtractedPage, FileRecord, ProcessingOutcome};
pub use queue_item::{ItemError, ItemStatus, QueueItem, QueueStats};
