//! Analysis adapter abstractions
//!
//! The pipeline talks to OCR and LLM/vision backends only through the traits
//! in this module. Adapters report recoverable conditions as [`AdapterError`];
//! the orchestrator maps them onto the per-item [`ErrorKind`] taxonomy.

pub mod llm;
pub mod local_ocr;
pub mod ocr;
pub mod ollama;

pub use llm::{Classification, GeneratedText, LlmProvider, VisionAnalysis, VisionProvider};
pub use local_ocr::LocalOcr;
pub use ocr::{OcrMode, OcrProvider};
pub use ollama::OllamaClient;

use thiserror::Error;

use crate::error::ErrorKind;

/// Result type for adapter calls
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Typed adapter outcomes
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterError {
    /// Input file could not be read
    #[error("unreadable input: {0}")]
    Unreadable(String),

    /// Adapter cannot handle this input format
    #[error("unsupported input: {0}")]
    Unsupported(String),

    /// Backend could not be reached
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// Backend did not answer in time
    #[error("timed out: {0}")]
    Timeout(String),

    /// Backend is up but the model or tool is not installed
    #[error("model missing: {0}")]
    ModelMissing(String),

    /// Any other adapter failure
    #[error("{0}")]
    Failed(String),
}

impl AdapterError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdapterError::Unreachable(_) | AdapterError::Timeout(_))
    }

    /// Pipeline error kind for a failure during `stage`
    pub fn kind(&self, stage: AdapterStage) -> ErrorKind {
        match self {
            AdapterError::Unreadable(_) => ErrorKind::ReadFailure,
            AdapterError::Unsupported(_) => ErrorKind::UnsupportedKind,
            AdapterError::Unreachable(_) => ErrorKind::AdapterUnreachable,
            AdapterError::Timeout(_) => ErrorKind::AdapterTimeout,
            AdapterError::ModelMissing(_) | AdapterError::Failed(_) => stage.failure_kind(),
        }
    }
}

/// Which adapter call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterStage {
    Ocr,
    Classify,
    Describe,
    Vision,
}

impl AdapterStage {
    pub fn failure_kind(&self) -> ErrorKind {
        match self {
            AdapterStage::Ocr => ErrorKind::OcrFailure,
            AdapterStage::Classify | AdapterStage::Vision => ErrorKind::ClassificationFailure,
            AdapterStage::Describe => ErrorKind::DescriptionFailure,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterStage::Ocr => "ocr",
            AdapterStage::Classify => "classify",
            AdapterStage::Describe => "describe",
            AdapterStage::Vision => "vision",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        let missing = AdapterError::ModelMissing("llava".into());
        assert_eq!(missing.kind(AdapterStage::Describe), ErrorKind::DescriptionFailure);
        assert_eq!(missing.kind(AdapterStage::Ocr), ErrorKind::OcrFailure);
        assert_eq!(
            AdapterError::Unreachable("refused".into()).kind(AdapterStage::Classify),
            ErrorKind::AdapterUnreachable
        );
        assert_eq!(
            AdapterError::Unreadable("denied".into()).kind(AdapterStage::Vision),
            ErrorKind::ReadFailure
        );
    }

    #[test]
    fn test_retryable() {
        assert!(AdapterError::Timeout("60s".into()).is_retryable());
        assert!(!AdapterError::Failed("bad json".into()).is_retryable());
    }
}
