//! docsift server binary
//!
//! Run with: cargo run -p docsift --bin docsift-server
//! Set DOCSIFT_CONFIG to a TOML file to override the defaults.

use docsift::{config::DocsiftConfig, discovery, server::DocsiftServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docsift=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                         docsift                           ║
║        OCR, tagging and descriptions for your files       ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    let config = DocsiftConfig::from_env_or_default()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Database: {}", config.storage.database_path.display());
    tracing::info!("  - Text model: {}", config.llm.text_model);
    tracing::info!("  - Vision model: {}", config.llm.vision_model);
    tracing::info!("  - OCR mode: {:?}", config.processing.ocr_mode);
    tracing::info!(
        "  - Review thresholds: ocr {:.2}, classification {:.2}",
        config.review.ocr_confidence_threshold,
        config.review.classification_confidence_threshold
    );

    tracing::info!("Checking Ollama at {}...", config.llm.base_url);
    let client = reqwest::Client::new();
    match client.get(format!("{}/api/tags", config.llm.base_url)).send().await {
        Ok(resp) if resp.status().is_success() => {
            tracing::info!("Ollama is running");
        }
        _ => {
            tracing::warn!("Ollama not available at {}", config.llm.base_url);
            tracing::warn!("Please start Ollama:");
            tracing::warn!("  1. Start: ollama serve");
            tracing::warn!(
                "  2. Pull models: ollama pull {} && ollama pull {}",
                config.llm.text_model,
                config.llm.vision_model
            );
        }
    }

    let server = DocsiftServer::new(config.clone()).await?;

    if !config.discovery.watch_dirs.is_empty() {
        let found = discovery::discover_all(&config.discovery.watch_dirs, config.discovery.recursive);
        let added = server
            .state()
            .queue()
            .add_batch(found, config.discovery.default_priority);
        tracing::info!(
            "Queued {} files from {} configured directories",
            added,
            config.discovery.watch_dirs.len()
        );
    }

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  POST /api/queue/scan  - Queue a directory");
    println!("  POST /api/run/start   - Start processing");
    println!("  GET  /api/run         - Run status");
    println!("  GET  /api/events      - Live progress (SSE)");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
