use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::agent::{AgentResponse, OrchestrateRequest};
use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn orchestrate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OrchestrateRequest>,
) -> Result<Json<AgentResponse>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query is required".to_string()));
    }

    let response = state.orchestrator.handle(request).await?;
    Ok(Json(response))
}
