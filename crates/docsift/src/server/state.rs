//! Application state for the docsift server

use std::sync::Arc;

use crate::config::DocsiftConfig;
use crate::error::Result;
use crate::processing::{Adapters, Orchestrator};
use crate::providers::{LocalOcr, OllamaClient};
use crate::queue::QueueManager;
use crate::storage::{ResultDb, ResultStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Arc<DocsiftConfig>,
    queue: Arc<QueueManager>,
    orchestrator: Orchestrator,
    store: Arc<ResultDb>,
}

impl AppState {
    /// Open the result store, build the local adapters and spawn the orchestrator
    pub async fn new(config: DocsiftConfig) -> Result<Self> {
        tracing::info!("Initializing docsift application state...");

        let store = Arc::new(ResultDb::new(&config.storage.database_path)?);
        tracing::info!("Result store opened at {}", config.storage.database_path.display());

        let ollama = Arc::new(OllamaClient::new(&config)?);
        tracing::info!(
            "Ollama client initialized (text: {}, vision: {})",
            config.llm.text_model,
            config.llm.vision_model
        );

        let ocr = LocalOcr::new(&config.ocr);
        if !ocr.has_tesseract().await {
            tracing::warn!(
                "tesseract not found at {}; image OCR will fail",
                config.ocr.tesseract_path.display()
            );
        }

        let adapters = Adapters {
            ocr: Arc::new(ocr),
            llm: ollama.clone(),
            vision: ollama,
        };

        Ok(Self::with_parts(config, store, adapters))
    }

    /// Assemble state from already-built parts
    pub fn with_parts(config: DocsiftConfig, store: Arc<ResultDb>, adapters: Adapters) -> Self {
        let config = Arc::new(config);
        let queue = Arc::new(QueueManager::new());
        let orchestrator = Orchestrator::spawn(
            Arc::clone(&config),
            Arc::clone(&queue),
            store.clone() as Arc<dyn ResultStore>,
            adapters,
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                queue,
                orchestrator,
                store,
            }),
        }
    }

    pub fn config(&self) -> &DocsiftConfig {
        &self.inner.config
    }

    pub fn queue(&self) -> &Arc<QueueManager> {
        &self.inner.queue
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.inner.orchestrator
    }

    pub fn store(&self) -> &Arc<ResultDb> {
        &self.inner.store
    }
}
