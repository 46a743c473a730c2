//! Retrieval-augmented generation.
//!
//! `agentic` runs the bounded retrieve/evaluate/refine loop, `retrieval`
//! is the single-pass variant, `sqlite` stores the document vectors.

pub mod agentic;
pub mod retrieval;
pub mod sqlite;
pub mod store;

pub use agentic::{AgenticOutcome, AgenticRag, NO_CONTEXT_APOLOGY};
pub use retrieval::{RetrievalOutcome, Retriever};
pub use sqlite::SqliteVectorStore;
pub use store::{NewDocument, RetrievedDocument, VectorStore};

use crate::core::errors::ApiError;
use crate::llm::CompletionProvider;

/// Numbered context block for grounded generation, `[n] title\ncontent`.
pub fn build_context(docs: &[RetrievedDocument]) -> String {
    docs.iter()
        .enumerate()
        .map(|(i, doc)| format!("[{}] {}\n{}", i + 1, doc.title, doc.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Embed and store a document. The embedded text is title and content
/// joined, so title-only queries still match.
pub async fn ingest_document(
    llm: &dyn CompletionProvider,
    store: &dyn VectorStore,
    document: NewDocument,
) -> Result<String, ApiError> {
    let text = format!("{}\n\n{}", document.title, document.content);
    let mut embeddings = llm.embed(&[text]).await?;
    if embeddings.is_empty() {
        return Err(ApiError::Upstream("Embedding response was empty".to_string()));
    }
    store.insert(document, embeddings.swap_remove(0)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_numbered_with_titles() {
        let docs = vec![
            RetrievedDocument {
                title: "Refund policy".to_string(),
                content: "30 day window.".to_string(),
                similarity: 0.9,
                source: "kb".to_string(),
            },
            RetrievedDocument {
                title: "Shipping".to_string(),
                content: "Ships in 2 days.".to_string(),
                similarity: 0.8,
                source: "kb".to_string(),
            },
        ];

        let context = build_context(&docs);
        assert_eq!(
            context,
            "[1] Refund policy\n30 day window.\n\n[2] Shipping\nShips in 2 days."
        );
    }

    #[test]
    fn empty_set_yields_empty_context() {
        assert_eq!(build_context(&[]), "");
    }
}
