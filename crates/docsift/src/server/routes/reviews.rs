//! Review queue endpoints

use axum::{extract::State, Json};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::Result;
use crate::processing::ReviewEdits;
use crate::server::state::AppState;
use crate::types::ProcessingOutcome;

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub path: PathBuf,
    #[serde(default)]
    pub edits: Option<ReviewEdits>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub path: PathBuf,
}

/// GET /api/reviews
pub async fn list_reviews(State(state): State<AppState>) -> Json<Vec<ProcessingOutcome>> {
    Json(state.orchestrator().pending_reviews())
}

/// POST /api/reviews/approve - Persist the held outcome
pub async fn approve(
    State(state): State<AppState>,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<ProcessingOutcome>> {
    let outcome = state
        .orchestrator()
        .approve_review(&request.path, request.edits)
        .await?;
    Ok(Json(outcome))
}

/// POST /api/reviews/reject
pub async fn reject(
    State(state): State<AppState>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<serde_json::Value>> {
    state.orchestrator().reject_review(&request.path)?;
    Ok(Json(serde_json::json!({ "rejected": request.path })))
}
