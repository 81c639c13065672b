//! Run control endpoints

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::{Error, Result};
use crate::processing::{ControlAction, OrchestratorStatus};
use crate::server::state::AppState;

/// GET /api/run
pub async fn run_status(State(state): State<AppState>) -> Json<OrchestratorStatus> {
    Json(state.orchestrator().status())
}

/// POST /api/run/:action - Rejected transitions come back as 409
pub async fn control(
    State(state): State<AppState>,
    Path(action): Path<String>,
) -> Result<Json<OrchestratorStatus>> {
    let action = ControlAction::parse(&action)
        .ok_or_else(|| Error::InvalidRequest(format!("Unknown action '{}'", action)))?;

    state.orchestrator().control(action)?;
    Ok(Json(state.orchestrator().status()))
}
