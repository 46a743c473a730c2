//! Single-pass retrieval.
//!
//! Embed, search once at the caller's relevance gate, optionally answer
//! from the matches. No evaluation or refinement; the agentic loop in
//! `agentic` is the iterative variant.

use std::sync::Arc;

use super::build_context;
use super::store::{RetrievedDocument, VectorStore};
use crate::core::config::RagConfig;
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, ChatRequest, CompletionProvider};

#[derive(Debug)]
pub struct RetrievalOutcome {
    pub documents: Vec<RetrievedDocument>,
    /// Grounded answer, present when enhancement was requested and at
    /// least one document matched.
    pub enhanced: Option<String>,
}

pub struct Retriever {
    llm: Arc<dyn CompletionProvider>,
    store: Arc<dyn VectorStore>,
    config: RagConfig,
}

impl Retriever {
    pub fn new(
        llm: Arc<dyn CompletionProvider>,
        store: Arc<dyn VectorStore>,
        config: RagConfig,
    ) -> Self {
        Self { llm, store, config }
    }

    /// One search pass at the relevance gate (default 0.7, 5 results).
    pub async fn retrieve(
        &self,
        query: &str,
        threshold: Option<f32>,
        count: Option<usize>,
    ) -> Result<Vec<RetrievedDocument>, ApiError> {
        let threshold = threshold.unwrap_or(self.config.relevance_threshold);
        let count = count.unwrap_or(self.config.answer_count);

        let mut embeddings = self.llm.embed(&[query.to_string()]).await?;
        if embeddings.is_empty() {
            return Err(ApiError::Upstream("Embedding response was empty".to_string()));
        }
        self.store
            .search(&embeddings.swap_remove(0), threshold, count)
            .await
    }

    /// Grounded completion over an already-retrieved set.
    pub async fn answer(
        &self,
        query: &str,
        documents: &[RetrievedDocument],
    ) -> Result<String, ApiError> {
        let context = build_context(documents);
        let request = ChatRequest::new(vec![
            ChatMessage::system(
                "You are a helpful assistant. Answer the user's question based on the \
                 provided context. If the context doesn't contain enough information, say so.",
            ),
            ChatMessage::user(format!("Context:\n{context}\n\nQuestion: {query}")),
        ])
        .with_temperature(0.7)
        .with_max_tokens(500);

        self.llm.chat(request).await
    }

    pub async fn run(
        &self,
        query: &str,
        threshold: Option<f32>,
        count: Option<usize>,
        enhance: bool,
    ) -> Result<RetrievalOutcome, ApiError> {
        let documents = self.retrieve(query, threshold, count).await?;

        let enhanced = if enhance && !documents.is_empty() {
            Some(self.answer(query, &documents).await?)
        } else {
            None
        };

        Ok(RetrievalOutcome {
            documents,
            enhanced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;

    use crate::rag::store::NewDocument;

    struct StubLlm {
        answer: &'static str,
        chats: Mutex<usize>,
    }

    #[async_trait]
    impl CompletionProvider for StubLlm {
        fn name(&self) -> &str {
            "stub"
        }

        async fn chat(&self, _: ChatRequest) -> Result<String, ApiError> {
            *self.chats.lock().unwrap() += 1;
            Ok(self.answer.to_string())
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
        last_args: Mutex<Option<(f32, usize)>>,
    }

    #[async_trait]
    impl VectorStore for StubStore {
        async fn insert(&self, _: NewDocument, _: Vec<f32>) -> Result<String, ApiError> {
            Ok("id".to_string())
        }

        async fn search(
            &self,
            _: &[f32],
            threshold: f32,
            count: usize,
        ) -> Result<Vec<RetrievedDocument>, ApiError> {
            *self.last_args.lock().unwrap() = Some((threshold, count));
            Ok(self.documents.clone())
        }

        async fn count(&self) -> Result<usize, ApiError> {
            Ok(self.documents.len())
        }
    }

    fn doc(title: &str) -> RetrievedDocument {
        RetrievedDocument {
            title: title.to_string(),
            content: "content".to_string(),
            similarity: 0.8,
            source: "kb".to_string(),
        }
    }

    #[tokio::test]
    async fn defaults_use_relevance_gate_and_answer_count() {
        let store = Arc::new(StubStore {
            documents: vec![doc("A")],
            last_args: Mutex::new(None),
        });
        let retriever = Retriever::new(
            Arc::new(StubLlm {
                answer: "a",
                chats: Mutex::new(0),
            }),
            store.clone(),
            RagConfig::default(),
        );

        retriever.retrieve("q", None, None).await.unwrap();
        assert_eq!(*store.last_args.lock().unwrap(), Some((0.7, 5)));
    }

    #[tokio::test]
    async fn enhancement_skipped_when_nothing_matches() {
        let llm = Arc::new(StubLlm {
            answer: "a",
            chats: Mutex::new(0),
        });
        let retriever = Retriever::new(
            llm.clone(),
            Arc::new(StubStore {
                documents: vec![],
                last_args: Mutex::new(None),
            }),
            RagConfig::default(),
        );

        let outcome = retriever.run("q", None, None, true).await.unwrap();
        assert!(outcome.documents.is_empty());
        assert!(outcome.enhanced.is_none());
        assert_eq!(*llm.chats.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn enhancement_answers_from_matches() {
        let retriever = Retriever::new(
            Arc::new(StubLlm {
                answer: "grounded answer [1]",
                chats: Mutex::new(0),
            }),
            Arc::new(StubStore {
                documents: vec![doc("A")],
                last_args: Mutex::new(None),
            }),
            RagConfig::default(),
        );

        let outcome = retriever.run("q", None, None, true).await.unwrap();
        assert_eq!(outcome.enhanced.as_deref(), Some("grounded answer [1]"));
    }
}
