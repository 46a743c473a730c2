use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::CompletionProvider;
use super::types::ChatRequest;
use crate::core::config::OpenAiConfig;
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(config: &OpenAiConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            client: Client::new(),
        }
    }

    async fn chat_completion(&self, request: &ChatRequest) -> Result<Value, ApiError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut body = json!({
            "model": self.chat_model,
            "messages": request.messages,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
            if request.json_mode {
                obj.insert(
                    "response_format".to_string(),
                    json!({ "type": "json_object" }),
                );
            }
        }

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "OpenAI chat error ({}): {}",
                status, text
            )));
        }

        res.json().await.map_err(ApiError::upstream)
    }

    fn extract_content(payload: &Value) -> Result<String, ApiError> {
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                ApiError::Upstream("OpenAI chat response missing message content".to_string())
            })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        let payload = self.chat_completion(&request).await?;
        Self::extract_content(&payload)
    }

    async fn chat_json(&self, request: ChatRequest) -> Result<Value, ApiError> {
        let payload = self.chat_completion(&request.json()).await?;
        let content = Self::extract_content(&payload)?;

        let value: Value = serde_json::from_str(content.trim()).map_err(|e| {
            ApiError::Upstream(format!("Provider returned malformed JSON: {}", e))
        })?;

        if !value.is_object() {
            return Err(ApiError::Upstream(
                "Provider returned JSON that is not an object".to_string(),
            ));
        }

        Ok(value)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = format!("{}/v1/embeddings", self.base_url);

        let body = json!({
            "model": self.embedding_model,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "OpenAI embedding error ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::upstream)?;

        let mut embeddings = Vec::new();
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(vals) = item["embedding"].as_array() {
                    let vec: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vec);
                }
            }
        }

        if embeddings.len() != inputs.len() {
            return Err(ApiError::Upstream(format!(
                "Embedding response returned {} vectors for {} inputs",
                embeddings.len(),
                inputs.len()
            )));
        }

        Ok(embeddings)
    }
}
