//! OCR provider trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::AdapterResult;
use crate::types::{ExtractedPage, FileKind};

/// Accuracy/speed trade-off for text extraction
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OcrMode {
    /// Use embedded text layers only
    #[default]
    Fast,
    /// Rasterize and OCR documents with no text layer
    HighAccuracy,
}

/// Trait for text extraction from documents and images
///
/// Implementations:
/// - `LocalOcr`: native parsers plus tesseract/pdftoppm
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Extract ordered page text with per-page confidence
    async fn process(
        &self,
        path: &Path,
        kind: FileKind,
        mode: OcrMode,
    ) -> AdapterResult<Vec<ExtractedPage>>;

    /// Check if the provider's tools are available
    async fn health_check(&self) -> bool {
        true
    }

    /// Get provider name for logging
    fn name(&self) -> &str;
}
