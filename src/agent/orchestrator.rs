//! Request dispatch.
//!
//! Classifies the query, routes to one concrete handler, and assembles
//! the response envelope with timed trace steps. Downstream failures with
//! a sensible degraded answer (a failed email send) keep the request
//! alive; everything else propagates.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Map, Value};

use super::response::{AgentResponse, OrchestrateRequest};
use super::trace::Trace;
use crate::core::config::AppConfig;
use crate::core::errors::ApiError;
use crate::email::{render_report_html, Mailer};
use crate::history::ConversationStore;
use crate::intent::{self, classify, Intent, IntentResult, Source};
use crate::llm::{ChatMessage, ChatRequest, CompletionProvider};
use crate::rag::{Retriever, VectorStore};
use crate::status::{status_summary, StatusProbe};
use crate::transactions::{
    build_chart, ChartType, Transaction, TransactionFilter, TransactionSource, TransactionSummary,
};
use crate::web::{WebSearch, WEB_ANSWER};

const EMAIL_SUBJECT: &str = "Transaction Intelligence Report";
const FALLBACK_EMAIL: &str = "user@example.com";

pub struct Orchestrator {
    llm: Arc<dyn CompletionProvider>,
    retriever: Retriever,
    transactions: Arc<dyn TransactionSource>,
    mailer: Arc<dyn Mailer>,
    web: Arc<dyn WebSearch>,
    status: Arc<dyn StatusProbe>,
    history: Option<Arc<ConversationStore>>,
    config: AppConfig,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<dyn CompletionProvider>,
        store: Arc<dyn VectorStore>,
        transactions: Arc<dyn TransactionSource>,
        mailer: Arc<dyn Mailer>,
        web: Arc<dyn WebSearch>,
        status: Arc<dyn StatusProbe>,
        history: Option<Arc<ConversationStore>>,
        config: AppConfig,
    ) -> Self {
        Self {
            retriever: Retriever::new(llm.clone(), store, config.rag.clone()),
            llm,
            transactions,
            mailer,
            web,
            status,
            history,
            config,
        }
    }

    pub async fn handle(&self, request: OrchestrateRequest) -> Result<AgentResponse, ApiError> {
        let start = Instant::now();
        let mut trace = Trace::new();

        let result = classify(&request.query);
        trace.push_completed(
            "Orchestrator",
            "Intent Classification",
            format!("Detected intent: {}", result.intent.as_str()),
        );
        tracing::info!(intent = result.intent.as_str(), "Dispatching query");

        let mut response = AgentResponse {
            content: String::new(),
            intent: result.intent,
            sources: Vec::new(),
            citations: Value::Array(Vec::new()),
            trace_steps: Vec::new(),
            metadata: Map::new(),
            table_data: None,
            chart_data: None,
        };

        match result.intent {
            Intent::TransactionEmail => {
                self.email_report(&request, &result, &mut response, &mut trace)
                    .await?
            }
            Intent::TransactionQuery => {
                self.transaction_query(&result, &mut response, &mut trace)
                    .await?
            }
            Intent::TransactionChart => {
                self.transaction_chart(&result, &mut response, &mut trace)
                    .await?
            }
            Intent::Sql | Intent::Report => {
                self.transaction_aggregate(&result, &mut response, &mut trace)
                    .await?
            }
            Intent::DocRag => {
                self.doc_rag(&request.query, &result, &mut response, &mut trace)
                    .await?
            }
            Intent::Chart => self.chart(&request.query, &mut response, &mut trace).await?,
            Intent::ApiStatus => self.api_status(&mut response, &mut trace).await,
            Intent::Web => self.web_search(&request.query, &mut response, &mut trace).await?,
            Intent::General => self.general(&request.query, &mut response, &mut trace).await?,
        }

        trace.push_completed("Orchestrator", "Response Synthesis", "Response assembled");

        let total_latency = start.elapsed().as_millis() as i64;
        response
            .metadata
            .insert("totalLatency".to_string(), json!(total_latency));
        response
            .metadata
            .insert("timestamp".to_string(), json!(Utc::now().timestamp_millis()));
        response.trace_steps = trace.into_steps();

        self.persist_message(&request, &response, total_latency);

        Ok(response)
    }

    async fn email_report(
        &self,
        request: &OrchestrateRequest,
        result: &IntentResult,
        response: &mut AgentResponse,
        trace: &mut Trace,
    ) -> Result<(), ApiError> {
        let step = trace.begin("Orchestrator", "Email Report");

        let email = param_str(&result.params, "email")
            .or_else(|| meta_str(&request.metadata, "email"))
            .unwrap_or_else(|| FALLBACK_EMAIL.to_string());
        let client_id =
            param_u64(&result.params, "clientId").or_else(|| meta_u64(&request.metadata, "lastClientId"));

        let filter = TransactionFilter {
            client_id,
            ..Default::default()
        };
        let rows = self.transactions.query(&filter).await?;
        let summary = TransactionSummary::from_transactions(rows);
        let html = render_report_html(&summary);

        match self.mailer.send(&email, EMAIL_SUBJECT, &html).await {
            Ok(_) => {
                response.content = format!("Transaction report sent to {email}");
                response.sources = vec![Source::Db, Source::Email];
                trace.complete(step, format!("Report emailed to {email}"));
            }
            Err(e) => {
                tracing::warn!("Email send failed: {e}");
                response.content =
                    format!("I found the transaction data but couldn't send the email: {e}");
                response.sources = vec![Source::Db];
                trace.fail(step, format!("Email send failed: {e}"));
            }
        }

        response.table_data = Some(summary);
        Ok(())
    }

    async fn transaction_query(
        &self,
        result: &IntentResult,
        response: &mut AgentResponse,
        trace: &mut Trace,
    ) -> Result<(), ApiError> {
        let step = trace.begin("Orchestrator", "Transaction Query");

        let client_id = param_u64(&result.params, "clientId");
        let filter = TransactionFilter {
            client_id,
            kind: param_str(&result.params, "type"),
            status: param_str(&result.params, "status"),
            ..Default::default()
        };

        let rows = self.transactions.query(&filter).await?;
        let summary = TransactionSummary::from_transactions(rows);

        response.content = summary.voice_summary();
        response.sources = vec![Source::Db];
        if let Some(id) = client_id {
            response.metadata.insert("lastClientId".to_string(), json!(id));
        }
        trace.complete(
            step,
            format!("Matched {} transactions", summary.total_transactions),
        );
        response.table_data = Some(summary);
        Ok(())
    }

    async fn transaction_chart(
        &self,
        result: &IntentResult,
        response: &mut AgentResponse,
        trace: &mut Trace,
    ) -> Result<(), ApiError> {
        let step = trace.begin("Orchestrator", "Transaction Chart");

        let client_id = param_u64(&result.params, "clientId");
        let chart_type = chart_type_param(&result.params);
        let filter = TransactionFilter {
            client_id,
            ..Default::default()
        };

        let rows = self.transactions.fetch_for_chart(&filter).await?;
        response.content = format!(
            "Generated {} chart showing {} transactions.",
            chart_type.as_str(),
            rows.len()
        );
        response.chart_data = Some(build_chart(chart_type, &rows));
        response.sources = vec![Source::Db];
        if let Some(id) = client_id {
            response.metadata.insert("lastClientId".to_string(), json!(id));
        }
        trace.complete(step, format!("Charted {} transactions", rows.len()));
        Ok(())
    }

    async fn transaction_aggregate(
        &self,
        result: &IntentResult,
        response: &mut AgentResponse,
        trace: &mut Trace,
    ) -> Result<(), ApiError> {
        let step = trace.begin("Orchestrator", "Transaction Aggregate");

        let filter = TransactionFilter {
            client_id: param_u64(&result.params, "clientId"),
            ..Default::default()
        };
        let rows = self.transactions.query(&filter).await?;
        let summary = TransactionSummary::from_transactions(rows);

        response.content = if result.intent == Intent::Report {
            format!(
                "{} Breakdown by type: {}.",
                summary.voice_summary(),
                type_breakdown(&summary.transactions)
            )
        } else {
            summary.voice_summary()
        };
        response.sources = vec![Source::Db];
        trace.complete(
            step,
            format!("Aggregated {} transactions", summary.total_transactions),
        );
        response.table_data = Some(summary);
        Ok(())
    }

    async fn doc_rag(
        &self,
        query: &str,
        result: &IntentResult,
        response: &mut AgentResponse,
        trace: &mut Trace,
    ) -> Result<(), ApiError> {
        let step = trace.begin("Orchestrator", "RAG Agent");
        let outcome = self.retriever.run(query, None, None, true).await?;

        let best_similarity = outcome
            .documents
            .first()
            .map(|d| d.similarity)
            .unwrap_or(0.0);
        let fallback_threshold = result
            .params
            .get("webFallbackThreshold")
            .and_then(|v| v.as_f64())
            .map(|v| v as f32)
            .unwrap_or(intent::WEB_FALLBACK_THRESHOLD);

        if result.sources.contains(&Source::Web) && best_similarity < fallback_threshold {
            trace.complete(
                step,
                format!("Best similarity {best_similarity:.2} below web fallback threshold"),
            );
            let web_step = trace.begin("Orchestrator", "Web Search");
            let results = self
                .web
                .search(query, self.config.search.max_results)
                .await?;
            response.content = WEB_ANSWER.to_string();
            response.citations = serde_json::to_value(&results).unwrap_or_default();
            response.sources = vec![Source::Vector, Source::Web];
            trace.complete(web_step, format!("Found {} web results", results.len()));
            return Ok(());
        }

        response.content = outcome
            .enhanced
            .unwrap_or_else(|| "No documents found.".to_string());
        response.citations = serde_json::to_value(&outcome.documents).unwrap_or_default();
        response.sources = vec![Source::Vector];
        trace.complete(
            step,
            format!("Retrieved {} documents", outcome.documents.len()),
        );
        Ok(())
    }

    async fn chart(
        &self,
        query: &str,
        response: &mut AgentResponse,
        trace: &mut Trace,
    ) -> Result<(), ApiError> {
        let step = trace.begin("Orchestrator", "Chart Generation");

        let chart_type = match intent::extract_chart_type(query) {
            "pie" => ChartType::Pie,
            "line" => ChartType::Line,
            _ => ChartType::Bar,
        };
        let rows = self
            .transactions
            .fetch_for_chart(&TransactionFilter::default())
            .await?;

        response.content = format!(
            "Generated {} chart showing {} transactions.",
            chart_type.as_str(),
            rows.len()
        );
        response.chart_data = Some(build_chart(chart_type, &rows));
        response.sources = vec![Source::Db];
        trace.complete(step, format!("Charted {} transactions", rows.len()));
        Ok(())
    }

    async fn api_status(&self, response: &mut AgentResponse, trace: &mut Trace) {
        let step = trace.begin("Orchestrator", "API Status");
        let statuses = self.status.check().await;

        response.content = status_summary(&statuses);
        response
            .metadata
            .insert("services".to_string(), serde_json::to_value(&statuses).unwrap_or_default());
        response.sources = vec![Source::Api];
        trace.complete(step, format!("Probed {} services", statuses.len()));
    }

    async fn web_search(
        &self,
        query: &str,
        response: &mut AgentResponse,
        trace: &mut Trace,
    ) -> Result<(), ApiError> {
        let step = trace.begin("Orchestrator", "Web Search");
        let results = self
            .web
            .search(query, self.config.search.max_results)
            .await?;

        response.content = WEB_ANSWER.to_string();
        response.citations = serde_json::to_value(&results).unwrap_or_default();
        response.sources = vec![Source::Web];
        trace.complete(step, format!("Found {} web results", results.len()));
        Ok(())
    }

    async fn general(
        &self,
        query: &str,
        response: &mut AgentResponse,
        trace: &mut Trace,
    ) -> Result<(), ApiError> {
        let step = trace.begin("Orchestrator", "LLM Chat");

        let request = ChatRequest::new(vec![
            ChatMessage::system("You are a helpful AI assistant."),
            ChatMessage::user(query),
        ])
        .with_temperature(0.7);

        response.content = self.llm.chat(request).await?;
        response.sources = vec![Source::Openai];
        trace.complete(step, "Answered directly");
        Ok(())
    }

    /// Fire-and-forget assistant-message persistence. Spawned so it never
    /// blocks or fails the response.
    fn persist_message(
        &self,
        request: &OrchestrateRequest,
        response: &AgentResponse,
        latency_ms: i64,
    ) {
        let (Some(history), Some(conversation_id)) =
            (self.history.clone(), request.conversation_id.clone())
        else {
            return;
        };

        let content = response.content.clone();
        let citations = response.citations.clone();
        tokio::spawn(async move {
            if let Err(e) = history
                .append_message(&conversation_id, "assistant", &content, &citations, latency_ms)
                .await
            {
                tracing::warn!("Failed to persist assistant message: {e}");
            }
        });
    }
}

fn param_str(params: &Map<String, Value>, key: &str) -> Option<String> {
    params.get(key).and_then(|v| v.as_str()).map(String::from)
}

fn param_u64(params: &Map<String, Value>, key: &str) -> Option<u64> {
    params.get(key).and_then(|v| v.as_u64())
}

fn meta_str(metadata: &Map<String, Value>, key: &str) -> Option<String> {
    metadata.get(key).and_then(|v| v.as_str()).map(String::from)
}

fn meta_u64(metadata: &Map<String, Value>, key: &str) -> Option<u64> {
    metadata.get(key).and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    })
}

fn chart_type_param(params: &Map<String, Value>) -> ChartType {
    match params.get("chartType").and_then(|v| v.as_str()) {
        Some("pie") => ChartType::Pie,
        Some("line") => ChartType::Line,
        _ => ChartType::Bar,
    }
}

fn type_breakdown(transactions: &[Transaction]) -> String {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for t in transactions {
        match counts.iter_mut().find(|(kind, _)| *kind == t.kind) {
            Some((_, n)) => *n += 1,
            None => counts.push((t.kind.clone(), 1)),
        }
    }
    if counts.is_empty() {
        return "no transactions".to_string();
    }
    counts
        .into_iter()
        .map(|(kind, n)| format!("{kind} {n}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::rag::store::{NewDocument, RetrievedDocument};
    use crate::status::ServiceStatus;
    use crate::web::WebResult;

    struct StubLlm;

    #[async_trait]
    impl CompletionProvider for StubLlm {
        fn name(&self) -> &str {
            "stub"
        }

        async fn chat(&self, _: ChatRequest) -> Result<String, ApiError> {
            Ok("direct answer".to_string())
        }

        async fn chat_json(&self, _: ChatRequest) -> Result<Value, ApiError> {
            Err(ApiError::Upstream("unused".to_string()))
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(inputs.iter().map(|_| vec![1.0]).collect())
        }
    }

    struct StubStore {
        documents: Vec<RetrievedDocument>,
    }

    #[async_trait]
    impl VectorStore for StubStore {
        async fn insert(&self, _: NewDocument, _: Vec<f32>) -> Result<String, ApiError> {
            Ok("id".to_string())
        }

        async fn search(
            &self,
            _: &[f32],
            _: f32,
            _: usize,
        ) -> Result<Vec<RetrievedDocument>, ApiError> {
            Ok(self.documents.clone())
        }

        async fn count(&self) -> Result<usize, ApiError> {
            Ok(self.documents.len())
        }
    }

    #[derive(Default)]
    struct RecordingTransactions {
        last_filter: Mutex<Option<TransactionFilter>>,
    }

    #[async_trait]
    impl TransactionSource for RecordingTransactions {
        async fn query(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, ApiError> {
            *self.last_filter.lock().unwrap() = Some(filter.clone());
            Ok(vec![Transaction {
                id: 1,
                client_id: filter.client_id.unwrap_or(0) as i64,
                kind: "PURCHASE".to_string(),
                tran_amt: 50.0,
                tran_status: "APPROVED".to_string(),
                tran_date: "2026-03-01".to_string(),
            }])
        }

        async fn fetch_for_chart(
            &self,
            filter: &TransactionFilter,
        ) -> Result<Vec<Transaction>, ApiError> {
            self.query(filter).await
        }
    }

    struct StubMailer {
        fail: bool,
    }

    #[async_trait]
    impl Mailer for StubMailer {
        async fn send(&self, _: &str, _: &str, _: &str) -> Result<String, ApiError> {
            if self.fail {
                Err(ApiError::ServiceUnavailable(
                    "Email service not configured".to_string(),
                ))
            } else {
                Ok("msg-1".to_string())
            }
        }
    }

    #[derive(Default)]
    struct StubWeb {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl WebSearch for StubWeb {
        async fn search(&self, _: &str, _: usize) -> Result<Vec<WebResult>, ApiError> {
            *self.calls.lock().unwrap() += 1;
            Ok(vec![WebResult {
                title: "Result".to_string(),
                url: "https://example.com".to_string(),
                snippet: "snippet".to_string(),
                position: 1,
            }])
        }
    }

    struct StubStatus;

    #[async_trait]
    impl StatusProbe for StubStatus {
        async fn check(&self) -> Vec<ServiceStatus> {
            vec![ServiceStatus {
                name: "payments".to_string(),
                url: "https://payments/health".to_string(),
                status: "operational".to_string(),
                latency_ms: 3,
            }]
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        transactions: Arc<RecordingTransactions>,
        web: Arc<StubWeb>,
    }

    fn harness(mailer_fails: bool, documents: Vec<RetrievedDocument>) -> Harness {
        let transactions = Arc::new(RecordingTransactions::default());
        let web = Arc::new(StubWeb::default());
        let orchestrator = Orchestrator::new(
            Arc::new(StubLlm),
            Arc::new(StubStore { documents }),
            transactions.clone(),
            Arc::new(StubMailer { fail: mailer_fails }),
            web.clone(),
            Arc::new(StubStatus),
            None,
            AppConfig::default(),
        );
        Harness {
            orchestrator,
            transactions,
            web,
        }
    }

    fn request(query: &str) -> OrchestrateRequest {
        OrchestrateRequest {
            query: query.to_string(),
            conversation_id: None,
            user_id: None,
            metadata: Map::new(),
        }
    }

    fn doc(similarity: f32) -> RetrievedDocument {
        RetrievedDocument {
            title: "Refund policy".to_string(),
            content: "30 days.".to_string(),
            similarity,
            source: "kb".to_string(),
        }
    }

    #[tokio::test]
    async fn client_5001_query_hits_transaction_source_with_db_source() {
        let h = harness(false, vec![]);
        let response = h
            .orchestrator
            .handle(request("Show transactions for client 5001"))
            .await
            .unwrap();

        let filter = h.transactions.last_filter.lock().unwrap().clone().unwrap();
        assert_eq!(filter.client_id, Some(5001));
        assert_eq!(response.intent, Intent::TransactionQuery);
        assert_eq!(response.sources, vec![Source::Db]);
        assert_eq!(response.metadata["lastClientId"], 5001);
        assert!(response.table_data.is_some());
    }

    #[tokio::test]
    async fn email_failure_still_returns_table_data() {
        let h = harness(true, vec![]);
        let response = h
            .orchestrator
            .handle(request("email the report for client 9 to user@example.com"))
            .await
            .unwrap();

        assert_eq!(response.intent, Intent::TransactionEmail);
        assert!(response
            .content
            .starts_with("I found the transaction data but couldn't send the email"));
        assert_eq!(response.sources, vec![Source::Db]);
        assert!(response.table_data.is_some());
    }

    #[tokio::test]
    async fn email_success_reports_both_sources() {
        let h = harness(false, vec![]);
        let response = h
            .orchestrator
            .handle(request("send report to user@example.com for client 9"))
            .await
            .unwrap();

        assert_eq!(response.content, "Transaction report sent to user@example.com");
        assert_eq!(response.sources, vec![Source::Db, Source::Email]);
        let filter = h.transactions.last_filter.lock().unwrap().clone().unwrap();
        assert_eq!(filter.client_id, Some(9));
    }

    #[tokio::test]
    async fn doc_rag_answers_from_vector_store() {
        let h = harness(false, vec![doc(0.9)]);
        let response = h
            .orchestrator
            .handle(request("What is the refund policy?"))
            .await
            .unwrap();

        assert_eq!(response.intent, Intent::DocRag);
        assert_eq!(response.sources, vec![Source::Vector]);
        assert_eq!(response.content, "direct answer");
        assert_eq!(response.citations[0]["title"], "Refund policy");
        assert_eq!(*h.web.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn low_similarity_default_route_falls_back_to_web() {
        // Query avoids all keyword lists so the classifier returns the
        // default doc_rag with a WEB fallback source.
        let h = harness(false, vec![doc(0.3)]);
        let response = h
            .orchestrator
            .handle(request("tell me about zorblax pricing"))
            .await
            .unwrap();

        assert_eq!(response.intent, Intent::DocRag);
        assert_eq!(response.sources, vec![Source::Vector, Source::Web]);
        assert_eq!(response.content, WEB_ANSWER);
        assert_eq!(*h.web.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn web_intent_dispatches_to_web_search() {
        let h = harness(false, vec![]);
        let response = h
            .orchestrator
            .handle(request("search the web for rust news"))
            .await
            .unwrap();

        assert_eq!(response.intent, Intent::Web);
        assert_eq!(response.sources, vec![Source::Web]);
        assert_eq!(response.content, WEB_ANSWER);
        assert_eq!(response.citations[0]["url"], "https://example.com");
        assert_eq!(*h.web.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn api_status_summarizes_probes() {
        let h = harness(false, vec![]);
        let response = h
            .orchestrator
            .handle(request("what is the uptime status?"))
            .await
            .unwrap();

        assert_eq!(response.intent, Intent::ApiStatus);
        assert_eq!(response.sources, vec![Source::Api]);
        assert_eq!(
            response.content,
            "1 of 1 monitored services are operational."
        );
        assert_eq!(response.metadata["services"][0]["name"], "payments");
    }

    #[tokio::test]
    async fn every_response_ends_with_synthesis_step_and_latency() {
        let h = harness(false, vec![]);
        let response = h
            .orchestrator
            .handle(request("Show transactions for client 5001"))
            .await
            .unwrap();

        let last = response.trace_steps.last().unwrap();
        assert_eq!(last.action, "Response Synthesis");
        assert!(response.metadata.get("totalLatency").is_some());
        assert!(response.metadata.get("timestamp").is_some());
        assert_eq!(response.trace_steps[0].action, "Intent Classification");
    }

    #[tokio::test]
    async fn chart_intent_builds_chart_over_full_set() {
        let h = harness(false, vec![]);
        let response = h
            .orchestrator
            .handle(request("plot a pie chart of daily volume"))
            .await
            .unwrap();

        assert!(response.chart_data.is_some());
        assert_eq!(response.sources, vec![Source::Db]);
    }
}
