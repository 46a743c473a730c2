//! Shared application state.
//!
//! Built once at startup; collaborators are trait objects behind `Arc`
//! so handlers and the orchestrator share them across requests.

use std::sync::Arc;

use crate::agent::Orchestrator;
use crate::core::config::{AppConfig, AppPaths, ConfigService};
use crate::email::{Mailer, ResendMailer};
use crate::history::ConversationStore;
use crate::llm::{CompletionProvider, OpenAiProvider};
use crate::rag::{AgenticRag, Retriever, SqliteVectorStore, VectorStore};
use crate::status::{HttpStatusProbe, StatusProbe};
use crate::transactions::{SqliteTransactionStore, TransactionSource};
use crate::web::{HttpWebSearch, WebSearch};

pub struct AppState {
    pub paths: AppPaths,
    pub config_service: ConfigService,
    pub config: AppConfig,
    pub llm: Arc<dyn CompletionProvider>,
    pub vector_store: Arc<dyn VectorStore>,
    pub transactions: Arc<dyn TransactionSource>,
    pub transaction_store: Arc<SqliteTransactionStore>,
    pub mailer: Arc<dyn Mailer>,
    pub web: Arc<dyn WebSearch>,
    pub status: Arc<dyn StatusProbe>,
    pub history: Arc<ConversationStore>,
    pub orchestrator: Orchestrator,
    pub agentic: AgenticRag,
    pub retriever: Retriever,
}

impl AppState {
    pub async fn initialize() -> anyhow::Result<Arc<Self>> {
        let paths = AppPaths::new();
        std::fs::create_dir_all(&paths.data_dir)?;

        let config_service = ConfigService::new(&paths);
        let config = config_service.load()?;
        config.validate()?;

        let llm: Arc<dyn CompletionProvider> = Arc::new(OpenAiProvider::new(&config.openai));
        let vector_store: Arc<dyn VectorStore> =
            Arc::new(SqliteVectorStore::new(paths.documents_db_path.clone()).await?);
        let transaction_store =
            Arc::new(SqliteTransactionStore::new(paths.transactions_db_path.clone()).await?);
        let transactions: Arc<dyn TransactionSource> = transaction_store.clone();
        let history = Arc::new(ConversationStore::new(paths.history_db_path.clone()).await?);
        let mailer: Arc<dyn Mailer> = Arc::new(ResendMailer::new(config.email.clone()));
        let web: Arc<dyn WebSearch> = Arc::new(HttpWebSearch::new(config.search.clone()));
        let status: Arc<dyn StatusProbe> = Arc::new(HttpStatusProbe::new(config.status.clone()));

        let orchestrator = Orchestrator::new(
            llm.clone(),
            vector_store.clone(),
            transactions.clone(),
            mailer.clone(),
            web.clone(),
            status.clone(),
            Some(history.clone()),
            config.clone(),
        );
        let agentic = AgenticRag::new(
            llm.clone(),
            vector_store.clone(),
            Some(history.clone()),
            config.rag.clone(),
        );
        let retriever = Retriever::new(llm.clone(), vector_store.clone(), config.rag.clone());

        Ok(Arc::new(Self {
            paths,
            config_service,
            config,
            llm,
            vector_store,
            transactions,
            transaction_store,
            mailer,
            web,
            status,
            history,
            orchestrator,
            agentic,
            retriever,
        }))
    }
}
