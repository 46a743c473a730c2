use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let sessions = state.history.list_sessions().await?;
    Ok(Json(json!({ "sessions": sessions })))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub title: Option<String>,
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<Value>, ApiError> {
    let session = state.history.create_session(request.title).await?;
    Ok(Json(json!({ "session": session })))
}

pub async fn session_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let messages = state.history.session_messages(&session_id).await?;
    Ok(Json(json!({ "messages": messages })))
}
