//! Orchestrator request and response envelopes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::trace::AgentStep;
use crate::intent::{Intent, Source};
use crate::transactions::{ChartData, TransactionSummary};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrateRequest {
    pub query: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Client-side conversation context, e.g. `lastClientId` or `email`
    /// carried over from a previous turn.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Terminal artifact returned to the caller; assembled once per request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub content: String,
    pub intent: Intent,
    pub sources: Vec<Source>,
    /// Retrieved documents or web results backing the answer.
    pub citations: Value,
    pub trace_steps: Vec<AgentStep>,
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_data: Option<TransactionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_data: Option<ChartData>,
}
