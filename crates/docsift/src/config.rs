//! Configuration for the docsift pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::providers::OcrMode;

/// Environment variable naming a TOML config file
pub const CONFIG_ENV: &str = "DOCSIFT_CONFIG";

/// Main docsift configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocsiftConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Result store location
    #[serde(default)]
    pub storage: StorageConfig,
    /// Pipeline tuning
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// Confidence gate thresholds
    #[serde(default)]
    pub review: ReviewConfig,
    /// Ollama/LLM configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Local OCR tool configuration
    #[serde(default)]
    pub ocr: OcrConfig,
    /// Directories to scan
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl DocsiftConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `DOCSIFT_CONFIG` if set, otherwise use defaults
    pub fn from_env_or_default() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                tracing::info!("Loading configuration from {}", PathBuf::from(&path).display());
                Self::load(path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Serialize back to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, value: f32| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(Error::Config(format!("{} must be within 0.0..=1.0, got {}", name, value)))
            }
        };
        unit("review.ocr_confidence_threshold", self.review.ocr_confidence_threshold)?;
        unit(
            "review.classification_confidence_threshold",
            self.review.classification_confidence_threshold,
        )?;

        if self.processing.max_tags == 0 {
            return Err(Error::Config("processing.max_tags must be at least 1".into()));
        }
        if self.processing.hash_chunk_size == 0 {
            return Err(Error::Config("processing.hash_chunk_size must be non-zero".into()));
        }
        if self.processing.ocr_timeout_secs == 0 || self.processing.llm_timeout_secs == 0 {
            return Err(Error::Config("adapter timeouts must be non-zero".into()));
        }
        if self.llm.base_url.trim().is_empty() {
            return Err(Error::Config("llm.base_url is empty".into()));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            enable_cors: true,
        }
    }
}

/// Result store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let database_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docsift")
            .join("docsift.db");
        Self { database_path }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// OCR accuracy mode
    #[serde(default)]
    pub ocr_mode: OcrMode,
    /// Read size used while hashing (default: 64 KiB)
    #[serde(default = "default_hash_chunk_size")]
    pub hash_chunk_size: usize,
    /// Tags kept per file after normalization
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,
    /// Extra attempts for unreachable/timed-out adapter calls
    #[serde(default = "default_adapter_retries")]
    pub adapter_retries: u32,
    /// Fixed pause between adapter attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Timeout for a single OCR call
    #[serde(default = "default_ocr_timeout")]
    pub ocr_timeout_secs: u64,
    /// Timeout for a single LLM or vision call, also used as the Ollama HTTP timeout
    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_secs: u64,
}

fn default_hash_chunk_size() -> usize { crate::hashing::DEFAULT_CHUNK_SIZE }
fn default_max_tags() -> usize { 6 }
fn default_adapter_retries() -> u32 { 1 }
fn default_retry_delay_ms() -> u64 { 500 }
fn default_ocr_timeout() -> u64 { 60 }
fn default_llm_timeout() -> u64 { 300 }

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            ocr_mode: OcrMode::default(),
            hash_chunk_size: default_hash_chunk_size(),
            max_tags: default_max_tags(),
            adapter_retries: default_adapter_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            ocr_timeout_secs: default_ocr_timeout(),
            llm_timeout_secs: default_llm_timeout(),
        }
    }
}

/// Confidence gate configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Documents whose mean OCR confidence falls below this need review
    #[serde(default = "default_threshold")]
    pub ocr_confidence_threshold: f32,
    /// Outcomes whose classification confidence falls below this need review
    #[serde(default = "default_threshold")]
    pub classification_confidence_threshold: f32,
    /// Documents with less trimmed text than this need review
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
    /// Persist review-required outcomes without waiting for a decision
    #[serde(default)]
    pub auto_approve: bool,
}

fn default_threshold() -> f32 { 0.7 }
fn default_min_text_chars() -> usize { 10 }

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            ocr_confidence_threshold: default_threshold(),
            classification_confidence_threshold: default_threshold(),
            min_text_chars: default_min_text_chars(),
            auto_approve: false,
        }
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Model used for tagging and descriptions
    pub text_model: String,
    /// Multimodal model used for images
    pub vision_model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Characters of extracted text sent to the model
    pub max_content_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            text_model: "llama3.2:3b".to_string(),
            vision_model: "llava".to_string(),
            temperature: 0.2,
            max_content_chars: 8000,
        }
    }
}

/// Local OCR tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Path to tesseract binary
    pub tesseract_path: PathBuf,
    /// Path to pdftoppm binary (poppler-utils)
    pub pdftoppm_path: PathBuf,
    /// Tesseract language pack
    pub language: String,
    /// Render resolution for scanned PDFs
    pub dpi: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: PathBuf::from("tesseract"),
            pdftoppm_path: PathBuf::from("pdftoppm"),
            language: "eng".to_string(),
            dpi: 300,
        }
    }
}

/// Discovery configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Directories scanned at startup
    #[serde(default)]
    pub watch_dirs: Vec<PathBuf>,
    /// Descend into subdirectories
    #[serde(default)]
    pub recursive: bool,
    /// Priority given to discovered files
    #[serde(default)]
    pub default_priority: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = DocsiftConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.processing.max_tags, 6);
        assert_eq!(config.processing.hash_chunk_size, 65536);
        assert_eq!(config.review.min_text_chars, 10);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = DocsiftConfig::default();
        config.review.auto_approve = true;
        config.discovery.watch_dirs = vec![PathBuf::from("/tmp/inbox")];
        let text = config.to_toml().unwrap();
        let parsed: DocsiftConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: DocsiftConfig = toml::from_str(
            r#"
            [review]
            min_text_chars = 25
            "#,
        )
        .unwrap();
        assert_eq!(parsed.review.min_text_chars, 25);
        assert_eq!(parsed.review.ocr_confidence_threshold, 0.7);
        assert_eq!(parsed.processing.max_tags, 6);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = DocsiftConfig::default();
        config.review.classification_confidence_threshold = 1.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = DocsiftConfig::default();
        config.processing.max_tags = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docsift.toml");
        std::fs::write(&path, "[processing]\nmax_tags = 4\n").unwrap();
        let config = DocsiftConfig::load(&path).unwrap();
        assert_eq!(config.processing.max_tags, 4);
    }

    #[test]
    fn test_hash_chunk_default_matches_hasher() {
        let parsed: DocsiftConfig = toml::from_str("[processing]\nmax_tags = 3\n").unwrap();
        assert_eq!(
            parsed.processing.hash_chunk_size,
            crate::hashing::DEFAULT_CHUNK_SIZE
        );
        assert_eq!(
            DocsiftConfig::default().processing.hash_chunk_size,
            crate::hashing::DEFAULT_CHUNK_SIZE
        );
    }
}
