use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::errors::ApiError;
use crate::rag::{ingest_document, NewDocument};
use crate::state::AppState;

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(document): Json<NewDocument>,
) -> Result<Json<Value>, ApiError> {
    if document.title.trim().is_empty() || document.content.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Title and content are required".to_string(),
        ));
    }

    let id = ingest_document(state.llm.as_ref(), state.vector_store.as_ref(), document).await?;
    tracing::info!(document_id = %id, "Ingested document");

    Ok(Json(json!({ "success": true, "id": id })))
}
