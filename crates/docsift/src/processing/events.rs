//! Progress events broadcast by the orchestrator

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::RunState;
use crate::types::ProcessingOutcome;

/// Per-batch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunCounters {
    pub fn total(&self) -> usize {
        self.processed + self.failed + self.skipped
    }
}

/// Named pipeline stages reported through [`ProcessingEvent::ItemProgress`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Hashing,
    CheckingDuplicates,
    ExtractingText,
    AnalyzingImage,
    GeneratingTags,
    GeneratingDescription,
    SavingResults,
}

impl Stage {
    /// Rough completion for the item at the start of this stage
    pub fn percent(&self) -> u8 {
        match self {
            Stage::Hashing => 10,
            Stage::CheckingDuplicates => 20,
            Stage::ExtractingText => 35,
            Stage::AnalyzingImage => 50,
            Stage::GeneratingTags => 60,
            Stage::GeneratingDescription => 80,
            Stage::SavingResults => 95,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Hashing => "Hashing",
            Stage::CheckingDuplicates => "Checking duplicates",
            Stage::ExtractingText => "Extracting text",
            Stage::AnalyzingImage => "Analyzing image",
            Stage::GeneratingTags => "Generating tags",
            Stage::GeneratingDescription => "Generating description",
            Stage::SavingResults => "Saving results",
        }
    }
}

/// Everything a caller can observe about a run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessingEvent {
    StateChanged {
        from: RunState,
        to: RunState,
    },
    ItemStarted {
        path: PathBuf,
    },
    ItemCompleted {
        outcome: Box<ProcessingOutcome>,
    },
    ItemSkipped {
        path: PathBuf,
        reason: String,
    },
    ItemFailed {
        path: PathBuf,
        code: String,
        message: String,
    },
    ItemProgress {
        path: PathBuf,
        percent: u8,
        stage: Stage,
        /// Human-readable [`Stage::label`]
        stage_label: &'static str,
    },
    ReviewRequired {
        outcome: Box<ProcessingOutcome>,
    },
    /// Batch position as each item starts
    Progress {
        current: usize,
        total: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_path: Option<PathBuf>,
    },
    RunFinished {
        run_id: Uuid,
        counters: RunCounters,
        elapsed_seconds: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_progress_carries_stage_label() {
        let event = ProcessingEvent::ItemProgress {
            path: PathBuf::from("/docs/scan.pdf"),
            percent: Stage::ExtractingText.percent(),
            stage: Stage::ExtractingText,
            stage_label: Stage::ExtractingText.label(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "item_progress");
        assert_eq!(json["stage"], "extracting_text");
        assert_eq!(json["stage_label"], "Extracting text");
        assert_eq!(json["percent"], 35);
    }
}
