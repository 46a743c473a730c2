use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::state::AppState;
use crate::status::status_summary;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn api_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let services = state.status.check().await;
    Json(json!({
        "summary": status_summary(&services),
        "services": services,
    }))
}
