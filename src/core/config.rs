//! Application configuration.
//!
//! Config lives in a single YAML file with an explicit load/save interface.
//! Secrets (API keys) are taken from the environment when present so they
//! never have to be written to disk, and are redacted when the config is
//! served over HTTP.

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ApiError;

const REDACT_PLACEHOLDER: &str = "****";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            cors_allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub chat_model: String,
    pub embedding_model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Admission threshold for the retrieval pass inside the agentic loop.
    /// Looser than `relevance_threshold` so the evaluator has real material
    /// to judge.
    pub match_threshold: f32,
    /// Candidate breadth for the retrieval pass.
    pub match_count: usize,
    /// Relevance gate for the single-pass retrieval route.
    pub relevance_threshold: f32,
    /// Result count for the single-pass retrieval route.
    pub answer_count: usize,
    /// Iteration budget for the agentic loop.
    pub max_iterations: u32,
    /// Below this best-similarity the default route falls back to web search.
    pub web_fallback_threshold: f32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.5,
            match_count: 8,
            relevance_threshold: 0.7,
            answer_count: 5,
            max_iterations: 3,
            web_fallback_threshold: 0.55,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub api_key: String,
    pub endpoint: String,
    pub from: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "https://api.resend.com/emails".to_string(),
            from: "Transaction Intelligence <onboarding@resend.dev>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub api_key: String,
    pub engine_id: String,
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            engine_id: String::new(),
            max_results: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Name -> health URL pairs probed by the api_status route.
    pub endpoints: Vec<StatusEndpoint>,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEndpoint {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub openai: OpenAiConfig,
    pub rag: RagConfig,
    pub email: EmailConfig,
    pub search: SearchConfig,
    pub status: StatusConfig,
}

impl AppConfig {
    /// Overlay secrets from the environment. Env always wins over the file
    /// so keys never need to be persisted.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            self.openai.api_key = key;
        }
        if let Ok(url) = env::var("OPENAI_BASE_URL") {
            self.openai.base_url = url;
        }
        if let Ok(key) = env::var("RESEND_API_KEY") {
            self.email.api_key = key;
        }
        if let Ok(key) = env::var("SEARCH_API_KEY") {
            self.search.api_key = key;
        }
        if let Ok(id) = env::var("SEARCH_ENGINE_ID") {
            self.search.engine_id = id;
        }
    }

    /// Missing credentials are a configuration error, reported at startup
    /// rather than surfacing mid-request.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.openai.api_key.trim().is_empty() {
            return Err(ApiError::ServiceUnavailable(
                "OPENAI_API_KEY is not configured".to_string(),
            ));
        }
        Ok(())
    }
}

/// Filesystem locations for config, databases and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub config_path: PathBuf,
    pub documents_db_path: PathBuf,
    pub transactions_db_path: PathBuf,
    pub history_db_path: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = env::var("VOICERAG_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        Self::with_data_dir(data_dir)
    }

    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            config_path: data_dir.join("config.yml"),
            documents_db_path: data_dir.join("documents.db"),
            transactions_db_path: data_dir.join("transactions.db"),
            history_db_path: data_dir.join("history.db"),
            log_dir: data_dir.join("logs"),
            data_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct ConfigService {
    path: PathBuf,
}

impl ConfigService {
    pub fn new(paths: &AppPaths) -> Self {
        Self {
            path: paths.config_path.clone(),
        }
    }

    /// Load config from disk, falling back to defaults when the file does
    /// not exist yet. Env overrides are applied on every load.
    pub fn load(&self) -> Result<AppConfig, ApiError> {
        let mut config = if self.path.exists() {
            let raw = fs::read_to_string(&self.path)
                .map_err(|e| ApiError::internal(format!("Failed to read config: {}", e)))?;
            serde_yaml::from_str::<AppConfig>(&raw)
                .map_err(|e| ApiError::internal(format!("Invalid config file: {}", e)))?
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Persist config to disk. Secrets are stripped before writing; they
    /// come back via the environment on the next load.
    pub fn save(&self, config: &AppConfig) -> Result<(), ApiError> {
        let mut on_disk = config.clone();
        on_disk.openai.api_key = String::new();
        on_disk.email.api_key = String::new();
        on_disk.search.api_key = String::new();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ApiError::internal(format!("Failed to create config dir: {}", e)))?;
        }

        let raw = serde_yaml::to_string(&on_disk)
            .map_err(|e| ApiError::internal(format!("Failed to serialize config: {}", e)))?;
        fs::write(&self.path, raw)
            .map_err(|e| ApiError::internal(format!("Failed to write config: {}", e)))?;
        Ok(())
    }

    /// Config as JSON with secrets masked, for the HTTP config endpoint.
    pub fn redacted(&self, config: &AppConfig) -> Value {
        let mut masked = config.clone();
        for key in [
            &mut masked.openai.api_key,
            &mut masked.email.api_key,
            &mut masked.search.api_key,
        ] {
            if !key.is_empty() {
                *key = REDACT_PLACEHOLDER.to_string();
            }
        }
        serde_json::to_value(&masked).unwrap_or(Value::Null)
    }
}
