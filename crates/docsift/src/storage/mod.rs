//! Result storage
//!
//! Provides SQLite-based persistence for analyzed files, pages, tags and
//! descriptions.

mod database;

pub use database::{ResultDb, SearchHit, StoreStats};

use crate::error::Result;
use crate::types::{FileRecord, ProcessingOutcome};

/// Persistence contract used by the pipeline
///
/// Implementations:
/// - `ResultDb`: SQLite
pub trait ResultStore: Send + Sync {
    /// Whether content with this hash already has stored tags or a description
    fn has_analysis(&self, content_hash: &str) -> Result<bool>;

    /// Write the record and replace its pages, tags and description.
    /// Returns the file id.
    fn save_outcome(&self, record: &FileRecord, outcome: &ProcessingOutcome) -> Result<i64>;

    /// Row counts
    fn stats(&self) -> Result<StoreStats>;
}
