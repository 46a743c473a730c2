//! VectorStore trait — abstract interface for the document vector store.
//!
//! The retrieval loop only needs similarity search over (title, content,
//! embedding, metadata) records; the primary implementation is
//! `SqliteVectorStore` in the `sqlite` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ApiError;

/// A document to be ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// One similarity-search hit, recomputed per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    pub title: String,
    pub similarity: f32,
    pub source: String,
}

/// Abstract vector store.
///
/// `search` returns an empty list (not an error) when nothing clears the
/// threshold.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persist a document with its embedding, returning the new id.
    async fn insert(&self, document: NewDocument, embedding: Vec<f32>) -> Result<String, ApiError>;

    /// Similarity search: candidates scoring at least `threshold`, best
    /// first, at most `count` results.
    async fn search(
        &self,
        query_embedding: &[f32],
        threshold: f32,
        count: usize,
    ) -> Result<Vec<RetrievedDocument>, ApiError>;

    /// Total stored document count.
    async fn count(&self) -> Result<usize, ApiError>;
}
