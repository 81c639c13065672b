//! Supported file kinds

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Kind of file the pipeline knows how to analyze
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// PDF document
    Pdf,
    /// Raster image, analyzed by the vision model
    Image,
    /// Plain text document (txt, md, csv, json, xml, yaml)
    Text,
    /// Office document (doc, docx, xls, xlsx, ppt, pptx)
    Office,
}

impl FileKind {
    /// Detect kind from extension. `None` means unsupported.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "tiff" | "tif" => Some(Self::Image),
            "txt" | "md" | "csv" | "json" | "xml" | "yaml" => Some(Self::Text),
            "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" => Some(Self::Office),
            _ => None,
        }
    }

    /// Detect kind from a path's extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Short label used in storage and fallback tags
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Text => "text",
            Self::Office => "office",
        }
    }

    /// Parse a stored label
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "pdf" => Some(Self::Pdf),
            "image" => Some(Self::Image),
            "text" => Some(Self::Text),
            "office" => Some(Self::Office),
            _ => None,
        }
    }

    /// Documents go through OCR, images through vision
    pub fn is_document(&self) -> bool {
        !matches!(self, Self::Image)
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_table() {
        assert_eq!(FileKind::from_extension("PDF"), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_extension("tif"), Some(FileKind::Image));
        assert_eq!(FileKind::from_extension("yaml"), Some(FileKind::Text));
        assert_eq!(FileKind::from_extension("pptx"), Some(FileKind::Office));
        assert_eq!(FileKind::from_extension("yml"), None);
        assert_eq!(FileKind::from_extension("exe"), None);
    }

    #[test]
    fn test_from_path() {
        assert_eq!(FileKind::from_path("/scans/receipt.JPG"), Some(FileKind::Image));
        assert_eq!(FileKind::from_path("/scans/README"), None);
    }
}
