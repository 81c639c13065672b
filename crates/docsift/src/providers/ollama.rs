//! Ollama client for classification, descriptions and image analysis
//!
//! All calls go to `/api/generate` with `format: "json"` and parse a small
//! JSON object out of the model response. Retries are left to the pipeline.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::{
    AdapterError, AdapterResult, Classification, GeneratedText, LlmProvider, VisionAnalysis,
    VisionProvider,
};
use crate::config::{DocsiftConfig, LlmConfig};
use crate::error::{Error, Result};
use crate::types::FileKind;

/// Confidence assumed when a model omits one
const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Budget for the `/api/tags` availability check
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Ollama API client
pub struct OllamaClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: LlmConfig,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsReply {
    #[serde(default)]
    tags: Vec<String>,
    confidence: Option<f32>,
}

#[derive(Deserialize)]
struct DescriptionReply {
    #[serde(default)]
    description: String,
    confidence: Option<f32>,
}

#[derive(Deserialize)]
struct VisionReply {
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    description: String,
    confidence: Option<f32>,
}

fn confidence(value: Option<f32>) -> f32 {
    value.unwrap_or(DEFAULT_CONFIDENCE).clamp(0.0, 1.0)
}

/// Parse the first JSON object embedded in a model response
fn parse_reply<T: DeserializeOwned>(raw: &str) -> AdapterResult<T> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let body = match (start, end) {
        (Some(s), Some(e)) if e > s => &raw[s..=e],
        _ => raw,
    };
    serde_json::from_str(body).map_err(|e| {
        AdapterError::Failed(format!("Unparseable model output ({}): {}", e, truncate(raw, 200)))
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn map_send_error(err: reqwest::Error, base_url: &str) -> AdapterError {
    if err.is_timeout() {
        AdapterError::Timeout(format!("Ollama request timed out: {}", err))
    } else if err.is_connect() {
        AdapterError::Unreachable(format!("Ollama not reachable at {}: {}", base_url, err))
    } else {
        AdapterError::Failed(format!("Ollama request failed: {}", err))
    }
}

impl OllamaClient {
    /// Create a new Ollama client.
    ///
    /// Requests are bounded by `processing.llm_timeout_secs`, the same budget
    /// the pipeline gives each LLM and vision call.
    pub fn new(config: &DocsiftConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Self::request_timeout(config))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.llm.clone(),
        })
    }

    /// HTTP timeout applied to generation requests
    pub fn request_timeout(config: &DocsiftConfig) -> Duration {
        Duration::from_secs(config.processing.llm_timeout_secs)
    }

    /// Check if Ollama is available
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        match self.client.get(&url).timeout(PING_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn generate(
        &self,
        model: &str,
        prompt: String,
        images: Option<Vec<String>>,
    ) -> AdapterResult<String> {
        let url = format!("{}/api/generate", self.config.base_url);
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            format: "json",
            images,
            options: GenerateOptions {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error(e, &self.config.base_url))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AdapterError::ModelMissing(format!(
                "model '{}' is not pulled (try: ollama pull {})",
                model, model
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Failed(format!(
                "Generation failed: HTTP {} - {}",
                status,
                truncate(&body, 200)
            )));
        }

        let reply: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Failed(format!("Failed to parse generation response: {}", e)))?;

        Ok(reply.response)
    }

    fn excerpt(&self, content: &str) -> String {
        truncate(content, self.config.max_content_chars)
    }
}

#[async_trait]
impl LlmProvider for OllamaClient {
    async fn classify(&self, content: &str, kind: FileKind) -> AdapterResult<Classification> {
        let prompt = format!(
            "You label files for a personal document archive.\n\
             The following text was extracted from a {} file.\n\
             Reply with JSON only: {{\"tags\": [up to 6 short lowercase topic tags], \
             \"confidence\": number between 0 and 1}}.\n\n\
             Text:\n{}",
            kind.label(),
            self.excerpt(content)
        );

        let raw = self.generate(&self.config.text_model, prompt, None).await?;
        let reply: TagsReply = parse_reply(&raw)?;
        Ok(Classification {
            tags: reply.tags,
            confidence: confidence(reply.confidence),
        })
    }

    async fn describe(&self, content: &str, tags: &[String]) -> AdapterResult<GeneratedText> {
        let prompt = format!(
            "Summarize the following document in two or three sentences.\n\
             It has been tagged: {}.\n\
             Reply with JSON only: {{\"description\": string, \"confidence\": number between 0 and 1}}.\n\n\
             Text:\n{}",
            tags.join(", "),
            self.excerpt(content)
        );

        let raw = self.generate(&self.config.text_model, prompt, None).await?;
        let reply: DescriptionReply = parse_reply(&raw)?;
        Ok(GeneratedText {
            text: reply.description.trim().to_string(),
            confidence: confidence(reply.confidence),
        })
    }

    async fn health_check(&self) -> bool {
        self.is_available().await
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.config.text_model
    }
}

#[async_trait]
impl VisionProvider for OllamaClient {
    async fn analyze(&self, path: &Path) -> AdapterResult<VisionAnalysis> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AdapterError::Unreadable(format!("{}: {}", path.display(), e)))?;
        let image = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let prompt = "Describe this image for a searchable photo archive.\n\
             Reply with JSON only: {\"tags\": [up to 6 short lowercase tags], \
             \"description\": one or two sentences, \"confidence\": number between 0 and 1}."
            .to_string();

        let raw = self
            .generate(&self.config.vision_model, prompt, Some(vec![image]))
            .await?;
        let reply: VisionReply = parse_reply(&raw)?;
        Ok(VisionAnalysis {
            tags: reply.tags,
            description: reply.description.trim().to_string(),
            confidence: confidence(reply.confidence),
        })
    }

    fn model(&self) -> &str {
        &self.config.vision_model
    }
}
