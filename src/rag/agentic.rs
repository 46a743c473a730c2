//! Agentic retrieval loop.
//!
//! A bounded retrieve/evaluate/refine cycle. Each pass embeds the working
//! query, searches the vector store with a loose admission threshold, then
//! asks the completion provider to judge whether the retrieved set can
//! answer the question. A failed judgment refines the query and retries;
//! a passing one generates the grounded answer. The loop always produces
//! an answer when documents exist, even if relevance stays low.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::store::{RetrievedDocument, VectorStore};
use super::build_context;
use crate::agent::trace::{AgentStep, Trace};
use crate::core::config::RagConfig;
use crate::core::errors::ApiError;
use crate::history::ContextMemory;
use crate::llm::{ChatMessage, ChatRequest, CompletionProvider};

pub const NO_CONTEXT_APOLOGY: &str =
    "I apologize, but I couldn't find relevant information to answer your question.";

/// The provider's structured judgment of one retrieved set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub is_relevant: bool,
    pub needs_more_info: bool,
    pub relevance_score: f32,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_refinement: Option<String>,
}

/// Per-request knobs; `None` falls back to the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct AgenticOptions {
    pub max_iterations: Option<u32>,
    pub relevance_threshold: Option<f32>,
    pub conversation_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug)]
pub struct AgenticOutcome {
    pub content: String,
    /// The retrieved set actually used for the final generation.
    pub citations: Vec<RetrievedDocument>,
    pub steps: Vec<AgentStep>,
    pub iterations: u32,
    pub final_query: String,
}

pub struct AgenticRag {
    llm: Arc<dyn CompletionProvider>,
    store: Arc<dyn VectorStore>,
    memory: Option<Arc<dyn ContextMemory>>,
    config: RagConfig,
}

impl AgenticRag {
    pub fn new(
        llm: Arc<dyn CompletionProvider>,
        store: Arc<dyn VectorStore>,
        memory: Option<Arc<dyn ContextMemory>>,
        config: RagConfig,
    ) -> Self {
        Self {
            llm,
            store,
            memory,
            config,
        }
    }

    pub async fn run(
        &self,
        query: &str,
        options: &AgenticOptions,
    ) -> Result<AgenticOutcome, ApiError> {
        let max_iterations = options
            .max_iterations
            .unwrap_or(self.config.max_iterations)
            .max(1);
        let relevance_threshold = options
            .relevance_threshold
            .unwrap_or(self.config.relevance_threshold);

        let mut trace = Trace::new();
        let mut current_query = query.to_string();
        let mut documents: Vec<RetrievedDocument> = Vec::new();
        let mut iteration = 0u32;

        while iteration < max_iterations {
            iteration += 1;
            tracing::debug!(iteration, query = %current_query, "agentic retrieval pass");

            let retrieve = trace.begin(
                "Retriever Agent",
                format!("Retrieving documents (iteration {iteration})"),
            );
            documents = self.retrieve(&current_query).await?;
            let avg_similarity = if documents.is_empty() {
                0.0
            } else {
                documents.iter().map(|d| d.similarity).sum::<f32>() / documents.len() as f32
            };
            trace.complete_with_data(
                retrieve,
                format!("Retrieved {} documents", documents.len()),
                json!({
                    "query": current_query,
                    "resultsCount": documents.len(),
                    "avgSimilarity": avg_similarity,
                }),
            );

            if documents.is_empty() {
                trace.push_completed(
                    "Context Response",
                    "No documents found",
                    "Unable to find relevant documents",
                );
                return Ok(AgenticOutcome {
                    content: NO_CONTEXT_APOLOGY.to_string(),
                    citations: Vec::new(),
                    steps: trace.into_steps(),
                    iterations: iteration,
                    final_query: current_query,
                });
            }

            let evaluate = trace.begin("Evaluator Agent", "Evaluating retrieval relevance");
            let evaluation = self
                .evaluate(&current_query, &documents, relevance_threshold)
                .await?;
            trace.complete_with_data(
                evaluate,
                evaluation.reasoning.clone(),
                json!({
                    "isRelevant": evaluation.is_relevant,
                    "needsMoreInfo": evaluation.needs_more_info,
                    "relevanceScore": evaluation.relevance_score,
                }),
            );

            self.store_iteration(options, iteration, &current_query, &evaluation, documents.len())
                .await;

            if evaluation.is_relevant && !evaluation.needs_more_info {
                break;
            }

            if evaluation.needs_more_info && iteration < max_iterations {
                let refine = trace.begin("Refiner Agent", "Refining query for better results");
                current_query = self.refine(&current_query, &evaluation).await?;
                trace.complete_with_data(
                    refine,
                    format!("Refined query: \"{current_query}\""),
                    json!({ "refinedQuery": current_query }),
                );
            } else {
                // Not relevant or out of budget: answer with what we have.
                break;
            }
        }

        let generate = trace.begin("Generator Agent", "Generating final response");
        let content = self.generate(&current_query, &documents).await?;
        trace.complete(
            generate,
            format!("Generated {} words", content.split_whitespace().count()),
        );

        Ok(AgenticOutcome {
            content,
            citations: documents,
            steps: trace.into_steps(),
            iterations: iteration,
            final_query: current_query,
        })
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>, ApiError> {
        let mut embeddings = self.llm.embed(&[query.to_string()]).await?;
        if embeddings.is_empty() {
            return Err(ApiError::Upstream("Embedding response was empty".to_string()));
        }
        self.store
            .search(
                &embeddings.swap_remove(0),
                self.config.match_threshold,
                self.config.match_count,
            )
            .await
    }

    async fn evaluate(
        &self,
        query: &str,
        documents: &[RetrievedDocument],
        relevance_threshold: f32,
    ) -> Result<EvaluationResult, ApiError> {
        let docs_context = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let snippet: String = doc.content.chars().take(300).collect();
                format!(
                    "[{}] {} (similarity: {:.2})\n{}...",
                    i + 1,
                    doc.title,
                    doc.similarity,
                    snippet
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "You are an evaluation agent. Assess if the retrieved documents can answer the user's query.\n\n\
             Query: \"{query}\"\n\n\
             Retrieved Documents:\n{docs_context}\n\n\
             Evaluate:\n\
             1. Are these documents relevant to the query?\n\
             2. Do they contain enough information to answer completely?\n\
             3. What is the relevance score (0-1)? Treat {relevance_threshold} as the bar for relevance.\n\n\
             Respond in JSON format:\n\
             {{\n\
               \"isRelevant\": boolean,\n\
               \"needsMoreInfo\": boolean,\n\
               \"relevanceScore\": number,\n\
               \"reasoning\": \"brief explanation\",\n\
               \"suggestedRefinement\": \"optional suggestion to improve query\"\n\
             }}"
        );

        let request = ChatRequest::new(vec![
            ChatMessage::system("You are a precise evaluation agent. Always respond with valid JSON."),
            ChatMessage::user(prompt),
        ])
        .with_temperature(0.3)
        .json();

        let value = self.llm.chat_json(request).await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::Upstream(format!("Malformed evaluation response: {e}")))
    }

    async fn refine(
        &self,
        query: &str,
        evaluation: &EvaluationResult,
    ) -> Result<String, ApiError> {
        let suggestion = evaluation
            .suggested_refinement
            .as_deref()
            .unwrap_or("none");
        let prompt = format!(
            "Original query: \"{query}\"\n\n\
             Evaluation feedback: {}\n\
             Suggested refinement: {suggestion}\n\n\
             Generate an improved, more specific query that will retrieve better results. \
             Keep it concise and focused.",
            evaluation.reasoning
        );

        let request = ChatRequest::new(vec![
            ChatMessage::system("You are a query refinement specialist. Output only the refined query."),
            ChatMessage::user(prompt),
        ])
        .with_temperature(0.5)
        .with_max_tokens(100);

        Ok(self.llm.chat(request).await?.trim().to_string())
    }

    async fn generate(
        &self,
        query: &str,
        documents: &[RetrievedDocument],
    ) -> Result<String, ApiError> {
        let context = build_context(documents);
        let request = ChatRequest::new(vec![
            ChatMessage::system(
                "You are a helpful AI assistant. Answer based on the provided context. \
                 Cite sources using [1], [2], etc.",
            ),
            ChatMessage::user(format!("Context:\n{context}\n\nQuestion: {query}")),
        ])
        .with_temperature(0.7)
        .with_max_tokens(800);

        self.llm.chat(request).await
    }

    /// Best-effort iteration memory. A failed write is logged and the loop
    /// proceeds.
    async fn store_iteration(
        &self,
        options: &AgenticOptions,
        iteration: u32,
        query: &str,
        evaluation: &EvaluationResult,
        retrieved_count: usize,
    ) {
        let (Some(memory), Some(conversation_id), Some(user_id)) = (
            self.memory.as_ref(),
            options.conversation_id.as_deref(),
            options.user_id.as_deref(),
        ) else {
            return;
        };

        let context = json!({
            "iteration": iteration,
            "query": query,
            "evaluation": evaluation,
            "retrievedCount": retrieved_count,
        });

        if let Err(e) = memory
            .store_iteration(conversation_id, user_id, context)
            .await
        {
            tracing::warn!("Context memory write failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::rag::store::NewDocument;

    #[derive(Default)]
    struct ScriptedLlm {
        chat_replies: Mutex<Vec<String>>,
        json_replies: Mutex<Vec<Value>>,
        chat_requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedLlm {
        fn with_json(self, replies: Vec<Value>) -> Self {
            *self.json_replies.lock().unwrap() = replies;
            self
        }

        fn with_chat(self, replies: Vec<&str>) -> Self {
            *self.chat_replies.lock().unwrap() =
                replies.into_iter().map(String::from).collect();
            self
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedLlm {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
            self.chat_requests.lock().unwrap().push(request);
            let mut replies = self.chat_replies.lock().unwrap();
            if replies.is_empty() {
                return Err(ApiError::Upstream("no scripted chat reply".to_string()));
            }
            Ok(replies.remove(0))
        }

        async fn chat_json(&self, request: ChatRequest) -> Result<Value, ApiError> {
            self.chat_requests.lock().unwrap().push(request);
            let mut replies = self.json_replies.lock().unwrap();
            if replies.is_empty() {
                return Err(ApiError::Upstream("no scripted json reply".to_string()));
            }
            Ok(replies.remove(0))
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct ScriptedStore {
        results: Mutex<Vec<Vec<RetrievedDocument>>>,
        searches: Mutex<usize>,
    }

    impl ScriptedStore {
        fn new(results: Vec<Vec<RetrievedDocument>>) -> Self {
            Self {
                results: Mutex::new(results),
                searches: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl VectorStore for ScriptedStore {
        async fn insert(&self, _: NewDocument, _: Vec<f32>) -> Result<String, ApiError> {
            Ok("id".to_string())
        }

        async fn search(
            &self,
            _: &[f32],
            _: f32,
            _: usize,
        ) -> Result<Vec<RetrievedDocument>, ApiError> {
            *self.searches.lock().unwrap() += 1;
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                return Ok(Vec::new());
            }
            Ok(results.remove(0))
        }

        async fn count(&self) -> Result<usize, ApiError> {
            Ok(0)
        }
    }

    fn doc(title: &str, similarity: f32) -> RetrievedDocument {
        RetrievedDocument {
            title: title.to_string(),
            content: format!("{title} content"),
            similarity,
            source: "kb".to_string(),
        }
    }

    fn passing_evaluation() -> Value {
        json!({
            "isRelevant": true,
            "needsMoreInfo": false,
            "relevanceScore": 0.9,
            "reasoning": "Documents cover the question."
        })
    }

    fn needs_more(refinement: &str) -> Value {
        json!({
            "isRelevant": false,
            "needsMoreInfo": true,
            "relevanceScore": 0.4,
            "reasoning": "Too thin.",
            "suggestedRefinement": refinement
        })
    }

    fn rag(llm: ScriptedLlm, store: ScriptedStore) -> AgenticRag {
        AgenticRag::new(
            Arc::new(llm),
            Arc::new(store),
            None,
            RagConfig::default(),
        )
    }

    #[tokio::test]
    async fn empty_first_retrieval_yields_apology_and_two_steps() {
        let rag = rag(ScriptedLlm::default(), ScriptedStore::new(vec![vec![]]));
        let outcome = rag.run("what?", &AgenticOptions::default()).await.unwrap();

        assert_eq!(outcome.content, NO_CONTEXT_APOLOGY);
        assert!(outcome.citations.is_empty());
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.steps.len(), 2);
        assert_eq!(outcome.steps[0].agent, "Retriever Agent");
        assert_eq!(outcome.steps[1].agent, "Context Response");
    }

    #[tokio::test]
    async fn relevant_first_pass_is_retrieve_evaluate_generate() {
        let llm = ScriptedLlm::default()
            .with_json(vec![passing_evaluation()])
            .with_chat(vec!["The refund window is 30 days [1]."]);
        let store = ScriptedStore::new(vec![vec![doc("Refund policy", 0.9)]]);
        let rag = rag(llm, store);

        let outcome = rag
            .run("refund policy?", &AgenticOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.steps.len(), 3);
        assert_eq!(outcome.steps[0].agent, "Retriever Agent");
        assert_eq!(outcome.steps[1].agent, "Evaluator Agent");
        assert_eq!(outcome.steps[2].agent, "Generator Agent");
        assert_eq!(outcome.content, "The refund window is 30 days [1].");
        assert_eq!(outcome.citations.len(), 1);
    }

    #[tokio::test]
    async fn refinement_loops_and_citations_come_from_final_set() {
        let llm = ScriptedLlm::default()
            .with_json(vec![needs_more("try refund window"), passing_evaluation()])
            .with_chat(vec!["refund window length", "30 days [1]."]);
        let store = ScriptedStore::new(vec![
            vec![doc("Vague doc", 0.55)],
            vec![doc("Refund policy", 0.92)],
        ]);
        let rag = rag(llm, store);

        let outcome = rag
            .run("refunds?", &AgenticOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.final_query, "refund window length");
        assert_eq!(outcome.citations.len(), 1);
        assert_eq!(outcome.citations[0].title, "Refund policy");
        let agents: Vec<_> = outcome.steps.iter().map(|s| s.agent.as_str()).collect();
        assert_eq!(
            agents,
            vec![
                "Retriever Agent",
                "Evaluator Agent",
                "Refiner Agent",
                "Retriever Agent",
                "Evaluator Agent",
                "Generator Agent"
            ]
        );
    }

    #[tokio::test]
    async fn iteration_budget_caps_the_loop_and_still_answers() {
        let llm = ScriptedLlm::default()
            .with_json(vec![
                needs_more("a"),
                needs_more("b"),
                needs_more("c"),
            ])
            .with_chat(vec!["q2", "q3", "best effort answer"]);
        let store = ScriptedStore::new(vec![
            vec![doc("D1", 0.5)],
            vec![doc("D2", 0.5)],
            vec![doc("D3", 0.5)],
        ]);
        let rag = rag(llm, store);

        let outcome = rag.run("q", &AgenticOptions::default()).await.unwrap();

        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.content, "best effort answer");
        assert_eq!(outcome.citations[0].title, "D3");
    }

    #[tokio::test]
    async fn not_relevant_without_refinement_generates_anyway() {
        let llm = ScriptedLlm::default()
            .with_json(vec![json!({
                "isRelevant": false,
                "needsMoreInfo": false,
                "relevanceScore": 0.2,
                "reasoning": "Off topic."
            })])
            .with_chat(vec!["weak answer"]);
        let store = ScriptedStore::new(vec![vec![doc("D", 0.5)]]);
        let rag = rag(llm, store);

        let outcome = rag.run("q", &AgenticOptions::default()).await.unwrap();
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.content, "weak answer");
    }

    #[tokio::test]
    async fn malformed_evaluation_is_a_hard_error() {
        let llm = ScriptedLlm::default()
            .with_json(vec![json!({"unexpected": true})]);
        let store = ScriptedStore::new(vec![vec![doc("D", 0.8)]]);
        let rag = rag(llm, store);

        let result = rag.run("q", &AgenticOptions::default()).await;
        assert!(matches!(result, Err(ApiError::Upstream(_))));
    }

    #[tokio::test]
    async fn context_memory_failure_does_not_fail_the_loop() {
        struct FailingMemory;

        #[async_trait]
        impl ContextMemory for FailingMemory {
            async fn store_iteration(
                &self,
                _: &str,
                _: &str,
                _: Value,
            ) -> Result<(), ApiError> {
                Err(ApiError::Internal("disk full".to_string()))
            }
        }

        let llm = ScriptedLlm::default()
            .with_json(vec![passing_evaluation()])
            .with_chat(vec!["answer"]);
        let store = ScriptedStore::new(vec![vec![doc("D", 0.8)]]);
        let rag = AgenticRag::new(
            Arc::new(llm),
            Arc::new(store),
            Some(Arc::new(FailingMemory)),
            RagConfig::default(),
        );

        let options = AgenticOptions {
            conversation_id: Some("c1".to_string()),
            user_id: Some("u1".to_string()),
            ..Default::default()
        };
        let outcome = rag.run("q", &options).await.unwrap();
        assert_eq!(outcome.content, "answer");
    }
}
