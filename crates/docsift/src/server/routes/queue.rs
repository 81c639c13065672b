//! Queue management endpoints

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::discovery;
use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{ItemStatus, QueueItem, QueueStats};

#[derive(Debug, Serialize)]
pub struct QueueListing {
    pub items: Vec<QueueItem>,
    pub stats: QueueStats,
}

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub paths: Vec<PathBuf>,
    #[serde(default)]
    pub priority: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub directories: Vec<PathBuf>,
    #[serde(default)]
    pub recursive: Option<bool>,
    #[serde(default)]
    pub priority: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct PathsRequest {
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearRequest {
    #[serde(default)]
    pub status: Option<ItemStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub path: PathBuf,
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct PathRequest {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct PriorityRequest {
    pub paths: Vec<PathBuf>,
    pub priority: i32,
}

/// Result of a bulk queue mutation
#[derive(Debug, Serialize)]
pub struct Affected {
    pub affected: usize,
    pub stats: QueueStats,
}

fn affected(state: &AppState, affected: usize) -> Json<Affected> {
    Json(Affected {
        affected,
        stats: state.queue().statistics(),
    })
}

/// GET /api/queue
pub async fn list_queue(State(state): State<AppState>) -> Json<QueueListing> {
    Json(QueueListing {
        items: state.queue().items(),
        stats: state.queue().statistics(),
    })
}

/// POST /api/queue - Enqueue files; duplicates and unsupported kinds are ignored
pub async fn add_files(
    State(state): State<AppState>,
    Json(request): Json<AddRequest>,
) -> Result<Json<Affected>> {
    if request.paths.is_empty() {
        return Err(Error::InvalidRequest("No paths provided".to_string()));
    }

    let priority = request
        .priority
        .unwrap_or(state.config().discovery.default_priority);
    let added = state.queue().add_batch(request.paths, priority);
    tracing::info!("Queued {} files via API", added);
    Ok(affected(&state, added))
}

/// DELETE /api/queue
pub async fn remove_files(
    State(state): State<AppState>,
    Json(request): Json<PathsRequest>,
) -> Json<Affected> {
    let removed = state.queue().remove_batch(&request.paths);
    affected(&state, removed)
}

/// POST /api/queue/scan - Discover supported files and enqueue them
pub async fn scan_directories(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<Affected>> {
    if let Some(missing) = request.directories.iter().find(|d| !d.exists()) {
        return Err(Error::NotFound(format!("{} does not exist", missing.display())));
    }

    let recursive = request
        .recursive
        .unwrap_or(state.config().discovery.recursive);
    let priority = request
        .priority
        .unwrap_or(state.config().discovery.default_priority);

    let directories = request.directories;
    let found = tokio::task::spawn_blocking(move || discovery::discover_all(&directories, recursive))
        .await
        .map_err(|e| Error::internal(format!("Scan task failed: {}", e)))?;

    let added = state.queue().add_batch(found, priority);
    tracing::info!("Scan queued {} files", added);
    Ok(affected(&state, added))
}

/// POST /api/queue/clear - Body may name a status to clear only those items
pub async fn clear_queue(
    State(state): State<AppState>,
    request: Option<Json<ClearRequest>>,
) -> Json<Affected> {
    let status = request.and_then(|Json(r)| r.status);
    let removed = state.queue().clear(status);
    affected(&state, removed)
}

fn found(moved: bool, path: &std::path::Path) -> Result<()> {
    if moved {
        Ok(())
    } else {
        Err(Error::NotFound(format!("{} is not queued", path.display())))
    }
}

/// POST /api/queue/reorder
pub async fn reorder_item(
    State(state): State<AppState>,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<QueueListing>> {
    found(state.queue().reorder(&request.path, request.index), &request.path)?;
    Ok(list_queue(State(state)).await)
}

/// POST /api/queue/move-up
pub async fn move_up(
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> Result<Json<QueueListing>> {
    found(state.queue().move_up(&request.path), &request.path)?;
    Ok(list_queue(State(state)).await)
}

/// POST /api/queue/move-down
pub async fn move_down(
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> Result<Json<QueueListing>> {
    found(state.queue().move_down(&request.path), &request.path)?;
    Ok(list_queue(State(state)).await)
}

/// POST /api/queue/priority
pub async fn set_priority(
    State(state): State<AppState>,
    Json(request): Json<PriorityRequest>,
) -> Json<Affected> {
    let changed = state
        .queue()
        .set_batch_priority(&request.paths, request.priority);
    affected(&state, changed)
}
