use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use chrono::Utc;

use crate::core::errors::ApiError;
use crate::rag::agentic::AgenticOptions;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgenticRequest {
    pub query: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub relevance_threshold: Option<f32>,
}

pub async fn agentic(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AgenticRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query is required".to_string()));
    }

    let options = AgenticOptions {
        max_iterations: request.max_iterations,
        relevance_threshold: request.relevance_threshold,
        conversation_id: request.conversation_id.clone(),
        user_id: request.user_id,
    };
    let outcome = state.agentic.run(&request.query, &options).await?;

    let total_latency = outcome
        .steps
        .last()
        .and_then(|last| last.end_time.map(|end| end - outcome.steps[0].start_time))
        .unwrap_or(0);

    Ok(Json(json!({
        "content": outcome.content,
        "citations": outcome.citations,
        "agentSteps": outcome.steps,
        "iterations": outcome.iterations,
        "finalQuery": outcome.final_query,
        "metadata": {
            "totalLatency": total_latency,
            "conversationId": request.conversation_id,
            "timestamp": Utc::now().timestamp_millis(),
        },
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveRequest {
    pub query: String,
    #[serde(default)]
    pub match_threshold: Option<f32>,
    #[serde(default)]
    pub match_count: Option<usize>,
    #[serde(default = "default_enhance")]
    pub enhance_with_context: bool,
}

fn default_enhance() -> bool {
    true
}

pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RetrieveRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query is required".to_string()));
    }

    let outcome = state
        .retriever
        .run(
            &request.query,
            request.match_threshold,
            request.match_count,
            request.enhance_with_context,
        )
        .await?;

    let results_found = outcome.documents.len();
    Ok(Json(json!({
        "query": request.query,
        "documents": outcome.documents,
        "enhancedResponse": outcome.enhanced,
        "metadata": {
            "matchThreshold": request.match_threshold.unwrap_or(state.config.rag.relevance_threshold),
            "matchCount": request.match_count.unwrap_or(state.config.rag.answer_count),
            "resultsFound": results_found,
        },
    })))
}
