use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn get_config(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let config = state.config_service.load()?;
    Ok(Json(state.config_service.redacted(&config)))
}

/// Persist config to disk. Secrets are stripped on save; changes apply on
/// the next process start.
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(config): Json<AppConfig>,
) -> Result<Json<Value>, ApiError> {
    state.config_service.save(&config)?;
    Ok(Json(json!({ "success": true })))
}
