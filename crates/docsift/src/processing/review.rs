//! Outcomes waiting for an approve/reject decision

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::tags::normalize_tags;
use crate::types::ProcessingOutcome;

/// Model name recorded for hand-edited tags or descriptions
pub const MANUAL_MODEL: &str = "manual";

/// Corrections applied on approval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewEdits {
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ReviewEdits {
    /// Apply edits; edited fields are attributed to a human at full confidence
    pub fn apply(self, outcome: &mut ProcessingOutcome, max_tags: usize) {
        if let Some(tags) = self.tags {
            outcome.tags = normalize_tags(&tags, max_tags);
            outcome.tag_model = MANUAL_MODEL.to_string();
            outcome.classification_confidence = 1.0;
        }
        if let Some(text) = self.description {
            outcome.description.text = text.trim().to_string();
            outcome.description.model = MANUAL_MODEL.to_string();
            outcome.description.confidence = 1.0;
        }
        outcome.needs_review = false;
    }
}

/// Held outcomes keyed by path
#[derive(Default)]
pub struct ReviewQueue {
    pending: DashMap<PathBuf, ProcessingOutcome>,
}

impl ReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold an outcome, replacing any earlier one for the same path
    pub fn insert(&self, outcome: ProcessingOutcome) {
        self.pending.insert(outcome.path.clone(), outcome);
    }

    pub fn take(&self, path: &Path) -> Option<ProcessingOutcome> {
        self.pending.remove(path).map(|(_, outcome)| outcome)
    }

    /// Snapshot sorted by path
    pub fn list(&self) -> Vec<ProcessingOutcome> {
        let mut outcomes: Vec<_> = self.pending.iter().map(|e| e.value().clone()).collect();
        outcomes.sort_by(|a, b| a.path.cmp(&b.path));
        outcomes
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Description, FileKind};

    fn outcome(path: &str) -> ProcessingOutcome {
        ProcessingOutcome {
            path: PathBuf::from(path),
            content_hash: "h".into(),
            kind: FileKind::Image,
            size: 10,
            extracted_pages: Vec::new(),
            tags: vec!["cat".into()],
            classification_confidence: 0.3,
            tag_model: "llava".into(),
            description: Description {
                text: "A blurry animal".into(),
                model: "llava".into(),
                confidence: 0.3,
            },
            ocr_confidence: None,
            needs_review: true,
            elapsed_seconds: 0.2,
        }
    }

    #[test]
    fn test_insert_take_list() {
        let queue = ReviewQueue::new();
        queue.insert(outcome("b.png"));
        queue.insert(outcome("a.png"));
        let paths: Vec<_> = queue.list().into_iter().map(|o| o.path).collect();
        assert_eq!(paths, vec![PathBuf::from("a.png"), PathBuf::from("b.png")]);

        assert!(queue.take(Path::new("a.png")).is_some());
        assert!(queue.take(Path::new("a.png")).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_edits_renormalize_tags() {
        let mut out = outcome("a.png");
        ReviewEdits {
            tags: Some(vec!["Dog".into(), "dog".into(), " park ".into()]),
            description: None,
        }
        .apply(&mut out, 6);

        assert_eq!(out.tags, vec!["Dog", "park"]);
        assert_eq!(out.tag_model, MANUAL_MODEL);
        assert_eq!(out.description.model, "llava");
        assert!(!out.needs_review);
    }
}
