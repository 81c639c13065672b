//! Per-item pipeline
//!
//! hash -> dedup check -> OCR or vision -> tags -> description -> confidence
//! gate -> persistence. Pause/stop requests are honored only at checkpoints:
//! before and after hashing, around every adapter attempt, and right before
//! persistence.

use parking_lot::Mutex;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::timeout;

use super::events::{ProcessingEvent, Stage};
use super::state::RunState;
use super::tags::normalize_tags;
use crate::config::{DocsiftConfig, ReviewConfig};
use crate::error::PipelineError;
use crate::hashing;
use crate::providers::{
    AdapterError, AdapterResult, AdapterStage, LlmProvider, OcrProvider, VisionProvider,
};
use crate::storage::ResultStore;
use crate::types::{Description, ExtractedPage, FileKind, FileRecord, ProcessingOutcome, QueueItem};

/// Model name recorded when no model produced the tags or description
pub const FALLBACK_MODEL: &str = "fallback";

/// Tag added to files with no extractable content
pub const NO_TEXT_TAG: &str = "no-text";

/// The analysis backends used by the pipeline
#[derive(Clone)]
pub struct Adapters {
    pub ocr: Arc<dyn OcrProvider>,
    pub llm: Arc<dyn LlmProvider>,
    pub vision: Arc<dyn VisionProvider>,
}

/// Why an item stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupt {
    Pause,
    Stop,
}

#[derive(Debug)]
pub(crate) enum StageError {
    Interrupted(Interrupt),
    Failed(PipelineError),
}

impl From<PipelineError> for StageError {
    fn from(err: PipelineError) -> Self {
        StageError::Failed(err)
    }
}

/// How an item left the pipeline
#[derive(Debug)]
pub(crate) enum ItemResult {
    /// Persisted
    Completed(ProcessingOutcome),
    /// Held for an approve/reject decision
    NeedsReview(ProcessingOutcome),
    Skipped { reason: String },
}

/// Per-item view of the orchestrator: checkpoint source and event sink
pub(crate) struct ItemContext<'a> {
    pub path: &'a Path,
    pub state: &'a Mutex<RunState>,
    pub events: &'a broadcast::Sender<ProcessingEvent>,
    /// Batch position (current, total) reported once the item gets going
    pub position: (usize, usize),
}

impl ItemContext<'_> {
    fn check(&self) -> Result<(), StageError> {
        match *self.state.lock() {
            RunState::Pausing => Err(StageError::Interrupted(Interrupt::Pause)),
            RunState::Stopping => Err(StageError::Interrupted(Interrupt::Stop)),
            _ => Ok(()),
        }
    }

    /// Announce the item after its first checkpoint passed
    fn started(&self) {
        let (current, total) = self.position;
        let _ = self.events.send(ProcessingEvent::ItemStarted {
            path: self.path.to_path_buf(),
        });
        let _ = self.events.send(ProcessingEvent::Progress {
            current,
            total,
            current_path: Some(self.path.to_path_buf()),
        });
    }

    fn progress(&self, stage: Stage) {
        let _ = self.events.send(ProcessingEvent::ItemProgress {
            path: self.path.to_path_buf(),
            percent: stage.percent(),
            stage,
            stage_label: stage.label(),
        });
    }
}

/// Whether an outcome must wait for a human decision
pub fn needs_review(outcome: &ProcessingOutcome, review: &ReviewConfig) -> bool {
    let low_classification =
        outcome.classification_confidence < review.classification_confidence_threshold;

    if !outcome.kind.is_document() {
        return low_classification;
    }

    let low_ocr = outcome.ocr_confidence.unwrap_or(0.0) < review.ocr_confidence_threshold;
    let short_text = outcome.full_text().trim().chars().count() < review.min_text_chars;
    low_ocr || low_classification || short_text
}

fn mean_confidence(pages: &[ExtractedPage]) -> f32 {
    if pages.is_empty() {
        return 0.0;
    }
    pages.iter().map(|p| p.confidence).sum::<f32>() / pages.len() as f32
}

/// Output of the kind-specific analysis branch
struct Analysis {
    pages: Vec<ExtractedPage>,
    tags: Vec<String>,
    classification_confidence: f32,
    tag_model: String,
    description: Description,
    ocr_confidence: Option<f32>,
}

impl Analysis {
    /// Shared result for documents and images nothing could be read from
    fn empty(kind: FileKind, pages: Vec<ExtractedPage>, ocr_confidence: Option<f32>) -> Self {
        let mut label = kind.label().to_string();
        if let Some(first) = label.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        Self {
            pages,
            tags: vec![kind.label().to_string(), NO_TEXT_TAG.to_string()],
            classification_confidence: 0.0,
            tag_model: FALLBACK_MODEL.to_string(),
            description: Description {
                text: format!("{} file with no extractable content.", label),
                model: FALLBACK_MODEL.to_string(),
                confidence: 0.0,
            },
            ocr_confidence,
        }
    }
}

pub(crate) struct Pipeline {
    config: Arc<DocsiftConfig>,
    adapters: Adapters,
    store: Arc<dyn ResultStore>,
}

impl Pipeline {
    pub fn new(config: Arc<DocsiftConfig>, adapters: Adapters, store: Arc<dyn ResultStore>) -> Self {
        Self {
            config,
            adapters,
            store,
        }
    }

    pub fn config(&self) -> &DocsiftConfig {
        &self.config
    }

    /// Run one item end to end
    pub async fn process(
        &self,
        item: &QueueItem,
        ctx: &ItemContext<'_>,
    ) -> Result<ItemResult, StageError> {
        let started = Instant::now();
        let path = item.path.as_path();

        ctx.check()?;
        ctx.started();
        ctx.progress(Stage::Hashing);
        let content_hash =
            hashing::content_hash(path, self.config.processing.hash_chunk_size).await;
        let size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
        ctx.check()?;

        ctx.progress(Stage::CheckingDuplicates);
        if self.has_analysis(&content_hash).await? {
            tracing::info!("Skipping {}: content already analyzed", path.display());
            return Ok(ItemResult::Skipped {
                reason: format!("duplicate content ({})", &content_hash[..12.min(content_hash.len())]),
            });
        }

        let analysis = if item.kind.is_document() {
            self.analyze_document(item, ctx).await?
        } else {
            self.analyze_image(item, ctx).await?
        };

        let mut outcome = ProcessingOutcome {
            path: item.path.clone(),
            content_hash,
            kind: item.kind,
            size,
            extracted_pages: analysis.pages,
            tags: normalize_tags(&analysis.tags, self.config.processing.max_tags),
            classification_confidence: analysis.classification_confidence,
            tag_model: analysis.tag_model,
            description: analysis.description,
            ocr_confidence: analysis.ocr_confidence,
            needs_review: false,
            elapsed_seconds: 0.0,
        };
        outcome.needs_review = needs_review(&outcome, &self.config.review);
        outcome.elapsed_seconds = started.elapsed().as_secs_f64();

        if outcome.needs_review && !self.config.review.auto_approve {
            tracing::info!("{} held for review", path.display());
            return Ok(ItemResult::NeedsReview(outcome));
        }

        ctx.check()?;
        ctx.progress(Stage::SavingResults);
        self.persist(&outcome).await?;
        outcome.elapsed_seconds = started.elapsed().as_secs_f64();

        tracing::info!(
            "Analyzed {} in {:.1}s ({} tags)",
            path.display(),
            outcome.elapsed_seconds,
            outcome.tags.len()
        );
        Ok(ItemResult::Completed(outcome))
    }

    async fn analyze_document(
        &self,
        item: &QueueItem,
        ctx: &ItemContext<'_>,
    ) -> Result<Analysis, StageError> {
        let processing = &self.config.processing;
        let path = item.path.as_path();
        let kind = item.kind;
        let mode = processing.ocr_mode;
        let ocr = &self.adapters.ocr;
        let llm = &self.adapters.llm;

        ctx.progress(Stage::ExtractingText);
        let pages = self
            .call(ctx, AdapterStage::Ocr, Duration::from_secs(processing.ocr_timeout_secs), move || {
                ocr.process(path, kind, mode)
            })
            .await?;

        let ocr_confidence = Some(mean_confidence(&pages));
        let text = pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        if text.trim().is_empty() {
            tracing::info!("{} has no extractable text", path.display());
            return Ok(Analysis::empty(kind, pages, ocr_confidence));
        }

        let llm_timeout = Duration::from_secs(processing.llm_timeout_secs);
        let content = text.as_str();

        ctx.progress(Stage::GeneratingTags);
        let classification = self
            .call(ctx, AdapterStage::Classify, llm_timeout, move || llm.classify(content, kind))
            .await?;

        let mut tags = normalize_tags(&classification.tags, processing.max_tags);
        if tags.is_empty() {
            tags.push(kind.label().to_string());
        }

        ctx.progress(Stage::GeneratingDescription);
        let chosen = tags.as_slice();
        let description = self
            .call(ctx, AdapterStage::Describe, llm_timeout, move || llm.describe(content, chosen))
            .await?;

        Ok(Analysis {
            pages,
            tags,
            classification_confidence: classification.confidence,
            tag_model: llm.model().to_string(),
            description: Description {
                text: description.text,
                model: llm.model().to_string(),
                confidence: description.confidence,
            },
            ocr_confidence,
        })
    }

    async fn analyze_image(
        &self,
        item: &QueueItem,
        ctx: &ItemContext<'_>,
    ) -> Result<Analysis, StageError> {
        let path = item.path.as_path();
        let vision = &self.adapters.vision;

        ctx.progress(Stage::AnalyzingImage);
        let analysis = self
            .call(
                ctx,
                AdapterStage::Vision,
                Duration::from_secs(self.config.processing.llm_timeout_secs),
                move || vision.analyze(path),
            )
            .await?;

        if analysis.is_empty() {
            tracing::info!("Vision model returned nothing for {}", path.display());
            return Ok(Analysis::empty(item.kind, Vec::new(), None));
        }

        let mut tags = analysis.tags;
        if normalize_tags(&tags, 1).is_empty() {
            tags = vec![item.kind.label().to_string()];
        }

        Ok(Analysis {
            pages: Vec::new(),
            tags,
            classification_confidence: analysis.confidence,
            tag_model: vision.model().to_string(),
            description: Description {
                text: analysis.description,
                model: vision.model().to_string(),
                confidence: analysis.confidence,
            },
            ocr_confidence: None,
        })
    }

    /// One adapter call with timeout, fixed-delay retry and checkpoints
    /// around every attempt
    async fn call<T, F, Fut>(
        &self,
        ctx: &ItemContext<'_>,
        stage: AdapterStage,
        limit: Duration,
        op: F,
    ) -> Result<T, StageError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AdapterResult<T>>,
    {
        let retries = self.config.processing.adapter_retries;
        let delay = Duration::from_millis(self.config.processing.retry_delay_ms);
        let mut attempt = 0u32;

        loop {
            ctx.check()?;
            let result = match timeout(limit, op()).await {
                Ok(result) => result,
                Err(_) => Err(AdapterError::Timeout(format!(
                    "{} call exceeded {}s",
                    stage.as_str(),
                    limit.as_secs()
                ))),
            };
            ctx.check()?;

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < retries => {
                    attempt += 1;
                    tracing::warn!(
                        "{} failed for {} (attempt {}/{}): {}, retrying",
                        stage.as_str(),
                        ctx.path.display(),
                        attempt,
                        retries + 1,
                        e
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    return Err(StageError::Failed(PipelineError::new(e.kind(stage), e.to_string())))
                }
            }
        }
    }

    async fn has_analysis(&self, content_hash: &str) -> Result<bool, PipelineError> {
        let store = Arc::clone(&self.store);
        let hash = content_hash.to_string();

        tokio::task::spawn_blocking(move || store.has_analysis(&hash))
            .await
            .map_err(|e| PipelineError::persistence(format!("dedup check crashed: {}", e)))?
            .map_err(|e| {
                tracing::error!("Dedup check failed: {}", e);
                PipelineError::persistence(e.to_string())
            })
    }

    /// Write an outcome to the result store
    pub async fn persist(&self, outcome: &ProcessingOutcome) -> Result<i64, PipelineError> {
        let store = Arc::clone(&self.store);
        let outcome = outcome.clone();
        let path = outcome.path.clone();

        tokio::task::spawn_blocking(move || {
            store.save_outcome(&FileRecord::from_outcome(&outcome), &outcome)
        })
        .await
        .map_err(|e| PipelineError::persistence(format!("save task crashed: {}", e)))?
        .map_err(|e| {
            tracing::error!("Failed to save results for {}: {}", path.display(), e);
            PipelineError::persistence(e.to_string())
        })
    }
}
