//! Stored result endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::storage::{ResultDb, ResultStore, SearchHit, StoreStats};

const DEFAULT_SEARCH_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

async fn blocking<T, F>(store: &Arc<ResultDb>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&ResultDb) -> Result<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| Error::internal(format!("Database task failed: {}", e)))?
}

/// GET /api/stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<StoreStats>> {
    let stats = blocking(state.store(), |db| db.stats()).await?;
    Ok(Json(stats))
}

/// GET /api/search?q=term&limit=n
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchHit>>> {
    if params.q.trim().is_empty() {
        return Err(Error::InvalidRequest("Query must not be empty".to_string()));
    }

    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let hits = blocking(state.store(), move |db| db.search(&params.q, limit)).await?;
    Ok(Json(hits))
}
