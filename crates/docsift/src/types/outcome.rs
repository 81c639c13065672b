//! Analysis outcome and persisted record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::FileKind;

/// Text extracted from one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPage {
    /// 1-based page number
    pub page_number: u32,
    pub text: String,
    /// 0.0..=1.0
    pub confidence: f32,
}

/// Generated description and its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    pub text: String,
    pub model: String,
    pub confidence: f32,
}

/// Result of running one file through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOutcome {
    pub path: PathBuf,
    pub content_hash: String,
    pub kind: FileKind,
    pub size: u64,
    /// Ordered by page
    pub extracted_pages: Vec<ExtractedPage>,
    /// Ordered, unique case-insensitively
    pub tags: Vec<String>,
    pub classification_confidence: f32,
    /// Model that produced the tags
    pub tag_model: String,
    pub description: Description,
    /// Mean page confidence, documents only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f32>,
    pub needs_review: bool,
    pub elapsed_seconds: f64,
}

impl ProcessingOutcome {
    /// All page text joined by blank lines
    pub fn full_text(&self) -> String {
        self.extracted_pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// File metadata row in the result store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub path: PathBuf,
    pub content_hash: String,
    pub kind: FileKind,
    pub page_count: u32,
    pub size: u64,
    pub analyzed_at: DateTime<Utc>,
}

impl FileRecord {
    /// Build the record for a finished outcome
    pub fn from_outcome(outcome: &ProcessingOutcome) -> Self {
        Self {
            id: None,
            path: outcome.path.clone(),
            content_hash: outcome.content_hash.clone(),
            kind: outcome.kind,
            page_count: outcome.extracted_pages.len() as u32,
            size: outcome.size,
            analyzed_at: Utc::now(),
        }
    }
}
