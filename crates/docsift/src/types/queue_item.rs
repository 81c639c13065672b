//! Queue item types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::FileKind;
use crate::error::PipelineError;

/// Status of a queued file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Skipped,
}

impl ItemStatus {
    /// Whether `self -> next` is a legal move.
    ///
    /// Failed -> Pending is only issued by the retry path.
    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Active, Completed)
                | (Active, Failed)
                | (Active, Skipped)
                | (Active, Pending)
                | (Failed, Pending)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Active => "active",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
            ItemStatus::Skipped => "skipped",
        }
    }
}

/// Failure detail kept on a Failed item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    pub code: String,
    pub message: String,
}

impl From<&PipelineError> for ItemError {
    fn from(err: &PipelineError) -> Self {
        Self {
            code: err.kind.code().to_string(),
            message: err.message.clone(),
        }
    }
}

/// One file tracked by the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub path: PathBuf,
    pub kind: FileKind,
    /// Higher runs first
    pub priority: i32,
    pub status: ItemStatus,
    pub added_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ItemError>,
}

impl QueueItem {
    pub fn new(path: PathBuf, kind: FileKind, priority: i32) -> Self {
        Self {
            path,
            kind,
            priority,
            status: ItemStatus::Pending,
            added_at: Utc::now(),
            started_at: None,
            completed_at: None,
            last_error: None,
        }
    }
}

/// Counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl QueueStats {
    pub fn count(&mut self, status: ItemStatus) {
        self.total += 1;
        match status {
            ItemStatus::Pending => self.pending += 1,
            ItemStatus::Active => self.active += 1,
            ItemStatus::Completed => self.completed += 1,
            ItemStatus::Failed => self.failed += 1,
            ItemStatus::Skipped => self.skipped += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use ItemStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Active.can_transition_to(Pending));
        assert!(Failed.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Skipped.can_transition_to(Active));
    }
}
