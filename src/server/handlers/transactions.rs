use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::errors::ApiError;
use crate::email::render_report_html;
use crate::state::AppState;
use crate::transactions::{build_chart, ChartType, TransactionFilter, TransactionSummary};

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(flatten)]
    pub filter: TransactionFilter,
}

pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<Value>, ApiError> {
    let rows = state.transactions.query(&request.filter).await?;
    let summary = TransactionSummary::from_transactions(rows);
    let voice_summary = summary.voice_summary();

    Ok(Json(json!({
        "success": true,
        "summary": summary,
        "voiceSummary": voice_summary,
        "query": request.query,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRequest {
    #[serde(default)]
    pub client_id: Option<u64>,
    #[serde(default)]
    pub chart_type: Option<ChartType>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
}

pub async fn chart(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChartRequest>,
) -> Result<Json<Value>, ApiError> {
    let filter = TransactionFilter {
        client_id: request.client_id,
        date_from: request.date_from,
        date_to: request.date_to,
        ..Default::default()
    };
    let chart_type = request.chart_type.unwrap_or_default();

    let rows = state.transactions.fetch_for_chart(&filter).await?;
    let chart_data = build_chart(chart_type, &rows);

    Ok(Json(json!({
        "success": true,
        "chartData": chart_data,
        "voiceSummary": format!(
            "Generated {} chart showing {} transactions.",
            chart_type.as_str(),
            rows.len()
        ),
        "transactionCount": rows.len(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    pub to: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub client_id: Option<u64>,
}

pub async fn email(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.to.trim().is_empty() {
        return Err(ApiError::BadRequest("Recipient is required".to_string()));
    }

    let filter = TransactionFilter {
        client_id: request.client_id,
        ..Default::default()
    };
    let rows = state.transactions.query(&filter).await?;
    let summary = TransactionSummary::from_transactions(rows);
    let html = render_report_html(&summary);

    let subject = request
        .subject
        .unwrap_or_else(|| "Transaction Intelligence Report".to_string());
    let email_id = state.mailer.send(&request.to, &subject, &html).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Email sent successfully",
        "emailId": email_id,
        "voiceSummary": format!("Transaction report sent to {}", request.to),
    })))
}
