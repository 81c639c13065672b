//! LLM and vision provider traits

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::AdapterResult;
use crate::types::FileKind;

/// Tags proposed for a piece of content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub tags: Vec<String>,
    pub confidence: f32,
}

/// Free text produced by a model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedText {
    pub text: String,
    pub confidence: f32,
}

/// Combined tagging and description of an image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisionAnalysis {
    pub tags: Vec<String>,
    pub description: String,
    pub confidence: f32,
}

impl VisionAnalysis {
    /// Neither tags nor description came back
    pub fn is_empty(&self) -> bool {
        self.description.trim().is_empty() && self.tags.iter().all(|t| t.trim().is_empty())
    }
}

/// Trait for text classification and description
///
/// Implementations:
/// - `OllamaClient`: local Ollama server
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Propose tags for extracted text
    async fn classify(&self, content: &str, kind: FileKind) -> AdapterResult<Classification>;

    /// Summarize extracted text, given the tags already chosen
    async fn describe(&self, content: &str, tags: &[String]) -> AdapterResult<GeneratedText>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> bool {
        true
    }

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}

/// Trait for multimodal image analysis
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Tag and describe an image in one call
    async fn analyze(&self, path: &Path) -> AdapterResult<VisionAnalysis>;

    /// Get the model being used
    fn model(&self) -> &str;
}
