//! Conversation history.
//!
//! Sessions, per-session messages with their citations and latency, and
//! the iteration-level context memory written by the retrieval loop.
//! Writers treat this store as best-effort; a failed insert never blocks
//! the response path.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;

/// Best-effort sink for per-iteration retrieval context.
#[async_trait]
pub trait ContextMemory: Send + Sync {
    async fn store_iteration(
        &self,
        conversation_id: &str,
        user_id: &str,
        context: Value,
    ) -> Result<(), ApiError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub citations: Value,
    pub latency_ms: i64,
    pub created_at: String,
}

pub struct ConversationStore {
    pool: SqlitePool,
}

impl ConversationStore {
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
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                citations TEXT NOT NULL DEFAULT '[]',
                latency_ms INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS context_memory (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                context_type TEXT NOT NULL,
                context_data TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    pub async fn create_session(&self, title: Option<String>) -> Result<Session, ApiError> {
        let id = uuid::Uuid::new_v4().to_string();
        let title = title.unwrap_or_else(|| "New conversation".to_string());

        sqlx::query("INSERT INTO sessions (id, title) VALUES (?1, ?2)")
            .bind(&id)
            .bind(&title)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        let row = sqlx::query("SELECT id, title, created_at FROM sessions WHERE id = ?1")
            .bind(&id)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(Session {
            id: row.get("id"),
            title: row.get("title"),
            created_at: row.get("created_at"),
        })
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>, ApiError> {
        let rows =
            sqlx::query("SELECT id, title, created_at FROM sessions ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(ApiError::internal)?;

        Ok(rows
            .iter()
            .map(|row| Session {
                id: row.get("id"),
                title: row.get("title"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    pub async fn session_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<MessageRecord>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, role, content, citations, latency_ms, created_at
             FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows
            .iter()
            .map(|row| {
                let citations_raw: String = row.get("citations");
                MessageRecord {
                    id: row.get("id"),
                    conversation_id: row.get("conversation_id"),
                    role: row.get("role"),
                    content: row.get("content"),
                    citations: serde_json::from_str(&citations_raw)
                        .unwrap_or(Value::Array(Vec::new())),
                    latency_ms: row.get("latency_ms"),
                    created_at: row.get("created_at"),
                }
            })
            .collect())
    }

    pub async fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
        citations: &Value,
        latency_ms: i64,
    ) -> Result<(), ApiError> {
        let citations_raw =
            serde_json::to_string(citations).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, citations, latency_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(conversation_id)
        .bind(role)
        .bind(content)
        .bind(&citations_raw)
        .bind(latency_ms)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }
}

#[async_trait]
impl ContextMemory for ConversationStore {
    async fn store_iteration(
        &self,
        conversation_id: &str,
        user_id: &str,
        context: Value,
    ) -> Result<(), ApiError> {
        let context_raw = serde_json::to_string(&context).unwrap_or_else(|_| "{}".to_string());

        sqlx::query(
            "INSERT INTO context_memory (id, conversation_id, user_id, context_type, context_data)
             VALUES (?1, ?2, ?3, 'retrieval_iteration', ?4)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(conversation_id)
        .bind(user_id)
        .bind(&context_raw)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }
}
