//! SQLite-backed vector store.
//!
//! In-process store using SQLite for document records and brute-force
//! cosine similarity for search.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{NewDocument, RetrievedDocument, VectorStore};
use crate::core::errors::ApiError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                url TEXT,
                metadata TEXT DEFAULT '{}',
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_source(metadata: &Option<Value>) -> String {
        metadata
            .as_ref()
            .and_then(|m| m.get("source"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert(&self, document: NewDocument, embedding: Vec<f32>) -> Result<String, ApiError> {
        let id = uuid::Uuid::new_v4().to_string();
        let blob = Self::serialize_embedding(&embedding);
        let metadata_str = document
            .metadata
            .as_ref()
            .map(|m| serde_json::to_string(m).unwrap_or_default())
            .unwrap_or_else(|| "{}".to_string());

        sqlx::query(
            "INSERT INTO documents (id, title, content, url, metadata, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&id)
        .bind(&document.title)
        .bind(&document.content)
        .bind(&document.url)
        .bind(&metadata_str)
        .bind(&blob)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(id)
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        threshold: f32,
        count: usize,
    ) -> Result<Vec<RetrievedDocument>, ApiError> {
        let rows = sqlx::query("SELECT title, content, metadata, embedding FROM documents")
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        let mut scored: Vec<RetrievedDocument> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored = Self::deserialize_embedding(&embedding_bytes);
                let similarity = Self::cosine_similarity(query_embedding, &stored);
                if similarity < threshold {
                    return None;
                }

                let metadata_str: String = row.get("metadata");
                let metadata = serde_json::from_str::<Value>(&metadata_str).ok();

                Some(RetrievedDocument {
                    content: row.get("content"),
                    title: row.get("title"),
                    similarity,
                    source: Self::row_source(&metadata),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(count.max(1));

        Ok(scored)
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_store() -> SqliteVectorStore {
        let tmp = std::env::temp_dir().join(format!("voicerag-docs-{}.db", uuid::Uuid::new_v4()));
        SqliteVectorStore::new(tmp).await.unwrap()
    }

    fn make_doc(title: &str, content: &str, source: &str) -> NewDocument {
        NewDocument {
            title: title.to_string(),
            content: content.to_string(),
            url: None,
            metadata: Some(json!({ "source": source })),
        }
    }

    #[tokio::test]
    async fn insert_and_search_by_similarity() {
        let store = test_store().await;

        store
            .insert(make_doc("Refund policy", "Refunds in 30 days", "kb"), vec![1.0, 0.0, 0.0])
            .await
            .unwrap();
        store
            .insert(make_doc("Onboarding", "Getting started", "kb"), vec![0.0, 1.0, 0.0])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let results = store.search(&[1.0, 0.0, 0.0], 0.5, 8).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Refund policy");
        assert_eq!(results[0].source, "kb");
        assert!(results[0].similarity > 0.99);
    }

    #[tokio::test]
    async fn search_below_threshold_returns_empty_not_error() {
        let store = test_store().await;
        store
            .insert(make_doc("Doc", "content", "kb"), vec![0.0, 1.0])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0], 0.5, 8).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_orders_best_first_and_truncates() {
        let store = test_store().await;
        store
            .insert(make_doc("Close", "a", "kb"), vec![0.9, 0.1])
            .await
            .unwrap();
        store
            .insert(make_doc("Closer", "b", "kb"), vec![1.0, 0.0])
            .await
            .unwrap();
        store
            .insert(make_doc("Far", "c", "kb"), vec![0.6, 0.8])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0], 0.1, 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Closer");
        assert_eq!(results[1].title, "Close");
    }

    #[tokio::test]
    async fn missing_source_metadata_defaults_to_unknown() {
        let store = test_store().await;
        store
            .insert(
                NewDocument {
                    title: "T".to_string(),
                    content: "C".to_string(),
                    url: None,
                    metadata: None,
                },
                vec![1.0],
            )
            .await
            .unwrap();

        let results = store.search(&[1.0], 0.5, 1).await.unwrap();
        assert_eq!(results[0].source, "unknown");
    }
}
