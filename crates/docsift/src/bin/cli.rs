//! docsift command line
//!
//! Run with: cargo run -p docsift --features cli --bin docsift -- analyze ~/Documents

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docsift::config::DocsiftConfig;
use docsift::discovery;
use docsift::processing::{Adapters, Orchestrator, ProcessingEvent, RunCounters, RunState};
use docsift::providers::{LocalOcr, OllamaClient};
use docsift::queue::QueueManager;
use docsift::storage::{ResultDb, ResultStore};

#[derive(Parser)]
#[command(name = "docsift")]
#[command(about = "Analyze local files: OCR, tags and descriptions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (defaults to $DOCSIFT_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the result database path
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover files under the given paths and analyze them
    Analyze {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Only look at the top level of each directory
        #[arg(long)]
        no_recursive: bool,
        /// Queue priority for these files
        #[arg(long, default_value_t = 0)]
        priority: i32,
        /// Persist low-confidence outcomes instead of holding them for review
        #[arg(long)]
        auto_approve: bool,
    },

    /// Search stored tags, descriptions and paths
    Search {
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show stored result counts
    Stats,

    /// Print the effective configuration as TOML
    Config,
}

fn load_config(cli: &Cli) -> Result<DocsiftConfig> {
    let mut config = match &cli.config {
        Some(path) => DocsiftConfig::load(path)?,
        None => DocsiftConfig::from_env_or_default()?,
    };
    if let Some(db_path) = &cli.db_path {
        config.storage.database_path = db_path.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docsift=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Analyze {
            paths,
            no_recursive,
            priority,
            auto_approve,
        } => {
            let mut config = config;
            config.review.auto_approve |= auto_approve;
            analyze(config, paths, !no_recursive, priority).await
        }
        Commands::Search { query, limit } => {
            let db = ResultDb::new(&config.storage.database_path)?;
            let hits = db.search(&query, limit)?;
            if hits.is_empty() {
                println!("{}", style("No matches").dim());
            }
            for hit in hits {
                println!("{}", style(hit.file.path.display()).bold());
                if !hit.tags.is_empty() {
                    println!("  {} {}", style("tags:").cyan(), hit.tags.join(", "));
                }
                if let Some(description) = hit.description {
                    println!("  {}", description);
                }
            }
            Ok(())
        }
        Commands::Stats => {
            let db = ResultDb::new(&config.storage.database_path)?;
            let stats = db.stats()?;
            println!("{}", style("Stored results").bold());
            println!("  files:        {}", stats.files);
            println!("  pages:        {}", stats.pages);
            println!("  tags:         {}", stats.tags);
            println!("  descriptions: {}", stats.descriptions);
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn analyze(
    config: DocsiftConfig,
    paths: Vec<PathBuf>,
    recursive: bool,
    priority: i32,
) -> Result<()> {
    let store = Arc::new(ResultDb::new(&config.storage.database_path).with_context(|| {
        format!("opening {}", config.storage.database_path.display())
    })?);

    let ollama = Arc::new(OllamaClient::new(&config)?);
    if !ollama.is_available().await {
        eprintln!(
            "{} Ollama is not reachable at {}; analysis steps will fail",
            style("warning:").yellow().bold(),
            config.llm.base_url
        );
    }
    let adapters = Adapters {
        ocr: Arc::new(LocalOcr::new(&config.ocr)),
        llm: ollama.clone(),
        vision: ollama,
    };

    let queue = Arc::new(QueueManager::new());
    let found = discovery::discover_all(&paths, recursive);
    let queued = queue.add_batch(found, priority);
    if queued == 0 {
        println!("{}", style("No supported files found").dim());
        return Ok(());
    }

    let orchestrator = Orchestrator::spawn(
        Arc::new(config),
        Arc::clone(&queue),
        store as Arc<dyn ResultStore>,
        adapters,
    );
    let mut events = orchestrator.subscribe();

    let bar = ProgressBar::new(queued as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>5}/{len:5} {msg}")?
            .progress_chars("#>-"),
    );

    let started = Instant::now();
    orchestrator.start()?;

    // Counters reset when a stopped run settles, so tally locally
    let mut counters = RunCounters::default();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                bar.set_message("stopping...");
                if let Err(e) = orchestrator.stop() {
                    tracing::debug!("Stop ignored: {}", e);
                }
            }
            event = events.recv() => match event {
                Ok(ProcessingEvent::ItemStarted { path }) => {
                    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                    bar.set_message(name);
                }
                Ok(ProcessingEvent::ItemCompleted { .. }) => {
                    counters.processed += 1;
                    bar.inc(1);
                }
                Ok(ProcessingEvent::ItemSkipped { .. }) => {
                    counters.skipped += 1;
                    bar.inc(1);
                }
                Ok(ProcessingEvent::ReviewRequired { outcome }) => {
                    bar.println(format!("{} {}", style("review").yellow(), outcome.path.display()));
                    counters.processed += 1;
                    bar.inc(1);
                }
                Ok(ProcessingEvent::ItemFailed { path, code, message }) => {
                    bar.println(format!("{} {} [{}] {}", style("failed").red(), path.display(), code, message));
                    counters.failed += 1;
                    bar.inc(1);
                }
                Ok(ProcessingEvent::StateChanged { to: RunState::Idle, .. }) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Progress display skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    bar.finish_and_clear();
    orchestrator.shutdown();

    println!(
        "{} {} processed, {} skipped, {} failed in {:.1}s",
        style("Done:").green().bold(),
        counters.processed,
        counters.skipped,
        counters.failed,
        started.elapsed().as_secs_f64()
    );

    let pending = orchestrator.pending_reviews();
    if !pending.is_empty() {
        println!(
            "{} {} outcomes were not saved because confidence was low; rerun with --auto-approve to keep them",
            style("note:").yellow(),
            pending.len()
        );
    }

    Ok(())
}
