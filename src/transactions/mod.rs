//! Transaction intelligence.
//!
//! Filterable queries over the transactions table plus derived summary
//! and chart payloads. The wire shapes keep the table's column names so
//! the UI renders rows without remapping.

pub mod chart;

pub use chart::{build_chart, ChartData, ChartType};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;

use crate::core::errors::ApiError;

const DEFAULT_QUERY_LIMIT: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: i64,
    pub client_id: i64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub tran_amt: f64,
    pub tran_status: String,
    /// ISO-8601 date or datetime string.
    pub tran_date: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionFilter {
    pub client_id: Option<u64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub total_transactions: usize,
    /// Dollar total, fixed to two decimals.
    pub total_amount: String,
    pub approved_count: usize,
    pub declined_count: usize,
    pub transactions: Vec<Transaction>,
}

impl TransactionSummary {
    pub fn from_transactions(transactions: Vec<Transaction>) -> Self {
        let total_amount: f64 = transactions.iter().map(|t| t.tran_amt).sum();
        let approved_count = transactions
            .iter()
            .filter(|t| t.tran_status == "APPROVED")
            .count();
        let declined_count = transactions
            .iter()
            .filter(|t| t.tran_status == "DECLINED")
            .count();

        Self {
            total_transactions: transactions.len(),
            total_amount: format!("{:.2}", total_amount),
            approved_count,
            declined_count,
            transactions,
        }
    }

    pub fn voice_summary(&self) -> String {
        format!(
            "Found {} transactions totaling ${}. {} approved, {} declined.",
            self.total_transactions, self.total_amount, self.approved_count, self.declined_count
        )
    }
}

/// Read access to the transactions table.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Filtered query, newest first, bounded by the filter's limit.
    async fn query(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, ApiError>;

    /// Filtered fetch in ascending date order for chart aggregation. The
    /// type/status/limit filter fields are ignored here.
    async fn fetch_for_chart(&self, filter: &TransactionFilter)
        -> Result<Vec<Transaction>, ApiError>;
}

pub struct SqliteTransactionStore {
    pool: SqlitePool,
}

impl SqliteTransactionStore {
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
            "CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id INTEGER NOT NULL,
                type TEXT NOT NULL,
                tran_amt REAL NOT NULL,
                tran_status TEXT NOT NULL,
                tran_date TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    pub async fn insert(
        &self,
        client_id: i64,
        kind: &str,
        tran_amt: f64,
        tran_status: &str,
        tran_date: &str,
    ) -> Result<i64, ApiError> {
        let result = sqlx::query(
            "INSERT INTO transactions (client_id, type, tran_amt, tran_status, tran_date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(client_id)
        .bind(kind)
        .bind(tran_amt)
        .bind(tran_status)
        .bind(tran_date)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(result.last_insert_rowid())
    }

    fn push_common_filters<'a>(
        builder: &mut sqlx::QueryBuilder<'a, sqlx::Sqlite>,
        filter: &'a TransactionFilter,
    ) {
        if let Some(client_id) = filter.client_id {
            builder.push(" AND client_id = ").push_bind(client_id as i64);
        }
        if let Some(from) = &filter.date_from {
            builder.push(" AND tran_date >= ").push_bind(from);
        }
        if let Some(to) = &filter.date_to {
            builder.push(" AND tran_date <= ").push_bind(to);
        }
    }
}

#[async_trait]
impl TransactionSource for SqliteTransactionStore {
    async fn query(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, ApiError> {
        let mut builder = sqlx::QueryBuilder::new(
            "SELECT id, client_id, type, tran_amt, tran_status, tran_date \
             FROM transactions WHERE 1=1",
        );
        Self::push_common_filters(&mut builder, filter);
        if let Some(kind) = &filter.kind {
            builder.push(" AND type = ").push_bind(kind.to_uppercase());
        }
        if let Some(status) = &filter.status {
            builder
                .push(" AND tran_status = ")
                .push_bind(status.to_uppercase());
        }
        builder
            .push(" ORDER BY tran_date DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT) as i64);

        builder
            .build_query_as::<Transaction>()
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)
    }

    async fn fetch_for_chart(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, ApiError> {
        let mut builder = sqlx::QueryBuilder::new(
            "SELECT id, client_id, type, tran_amt, tran_status, tran_date \
             FROM transactions WHERE 1=1",
        );
        Self::push_common_filters(&mut builder, filter);
        builder.push(" ORDER BY tran_date ASC");

        builder
            .build_query_as::<Transaction>()
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_store() -> SqliteTransactionStore {
        let tmp =
            std::env::temp_dir().join(format!("voicerag-tx-{}.db", uuid::Uuid::new_v4()));
        let store = SqliteTransactionStore::new(tmp).await.unwrap();

        store
            .insert(5001, "PURCHASE", 120.50, "APPROVED", "2026-03-01")
            .await
            .unwrap();
        store
            .insert(5001, "REFUND", 30.25, "DECLINED", "2026-03-02")
            .await
            .unwrap();
        store
            .insert(7002, "PURCHASE", 10.00, "APPROVED", "2026-03-03")
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn query_filters_by_client_newest_first() {
        let store = seeded_store().await;
        let filter = TransactionFilter {
            client_id: Some(5001),
            ..Default::default()
        };

        let rows = store.query(&filter).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].tran_date, "2026-03-02");
        assert!(rows.iter().all(|t| t.client_id == 5001));
    }

    #[tokio::test]
    async fn type_and_status_filters_are_case_insensitive() {
        let store = seeded_store().await;
        let filter = TransactionFilter {
            kind: Some("purchase".to_string()),
            status: Some("approved".to_string()),
            ..Default::default()
        };

        let rows = store.query(&filter).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|t| t.kind == "PURCHASE"));
    }

    #[tokio::test]
    async fn chart_fetch_is_ascending_and_unbounded() {
        let store = seeded_store().await;
        let rows = store
            .fetch_for_chart(&TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].tran_date, "2026-03-01");
        assert_eq!(rows[2].tran_date, "2026-03-03");
    }

    #[test]
    fn summary_totals_and_voice_line() {
        let transactions = vec![
            Transaction {
                id: 1,
                client_id: 5001,
                kind: "PURCHASE".to_string(),
                tran_amt: 120.50,
                tran_status: "APPROVED".to_string(),
                tran_date: "2026-03-01".to_string(),
            },
            Transaction {
                id: 2,
                client_id: 5001,
                kind: "REFUND".to_string(),
                tran_amt: 30.25,
                tran_status: "DECLINED".to_string(),
                tran_date: "2026-03-02".to_string(),
            },
        ];

        let summary = TransactionSummary::from_transactions(transactions);
        assert_eq!(summary.total_amount, "150.75");
        assert_eq!(summary.approved_count, 1);
        assert_eq!(summary.declined_count, 1);
        assert_eq!(
            summary.voice_summary(),
            "Found 2 transactions totaling $150.75. 1 approved, 1 declined."
        );
    }

    #[test]
    fn summary_serializes_camel_case_with_raw_rows() {
        let summary = TransactionSummary::from_transactions(vec![Transaction {
            id: 1,
            client_id: 5001,
            kind: "PURCHASE".to_string(),
            tran_amt: 10.0,
            tran_status: "APPROVED".to_string(),
            tran_date: "2026-03-01".to_string(),
        }]);

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["totalTransactions"], 1);
        assert_eq!(value["transactions"][0]["client_id"], 5001);
        assert_eq!(value["transactions"][0]["type"], "PURCHASE");
    }
}
