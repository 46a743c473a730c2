//! Web search fallback.
//!
//! Google Custom Search when credentials are configured, DuckDuckGo's
//! instant-answer API otherwise.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::core::config::SearchConfig;
use crate::core::errors::ApiError;

pub const WEB_ANSWER: &str = "I found the following information based on a web search.";

#[derive(Debug, Clone, Serialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub position: usize,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>, ApiError>;
}

pub struct HttpWebSearch {
    client: reqwest::Client,
    config: SearchConfig,
}

impl HttpWebSearch {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn google_search(&self, query: &str) -> Result<Vec<WebResult>, ApiError> {
        let url = format!(
            "https://www.googleapis.com/customsearch/v1?key={}&cx={}&q={}",
            self.config.api_key,
            self.config.engine_id,
            urlencoding::encode(query)
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "Google search failed: {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(ApiError::upstream)?;
        let items = payload
            .get("items")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(collect_results(&items, "title", "link", "snippet"))
    }

    async fn duckduckgo_search(&self, query: &str) -> Result<Vec<WebResult>, ApiError> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_redirect=1&no_html=1",
            urlencoding::encode(query)
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "DuckDuckGo search failed: {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(ApiError::upstream)?;
        let mut results = Vec::new();

        if let (Some(text), Some(url)) = (
            payload.get("AbstractText").and_then(|v| v.as_str()),
            payload.get("AbstractURL").and_then(|v| v.as_str()),
        ) {
            if !text.is_empty() && !url.is_empty() {
                results.push(WebResult {
                    title: text.split(" - ").next().unwrap_or(text).to_string(),
                    url: url.to_string(),
                    snippet: text.to_string(),
                    position: 0,
                });
            }
        }

        if let Some(items) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
            for item in items {
                let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
                let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
                if text.is_empty() || url.is_empty() {
                    continue;
                }
                results.push(WebResult {
                    title: text.split(" - ").next().unwrap_or(text).to_string(),
                    url: url.to_string(),
                    snippet: text.to_string(),
                    position: 0,
                });
            }
        }

        Ok(results)
    }
}

fn collect_results(items: &[Value], title_key: &str, url_key: &str, snippet_key: &str) -> Vec<WebResult> {
    let mut results = Vec::new();
    for item in items {
        let title = item.get(title_key).and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get(url_key).and_then(|v| v.as_str()).unwrap_or("");
        let snippet = item.get(snippet_key).and_then(|v| v.as_str()).unwrap_or("");
        if !title.is_empty() && !url.is_empty() {
            results.push(WebResult {
                title: title.to_string(),
                url: url.to_string(),
                snippet: snippet.to_string(),
                position: 0,
            });
        }
    }
    results
}

#[async_trait]
impl WebSearch for HttpWebSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>, ApiError> {
        let mut results = if !self.config.api_key.is_empty() && !self.config.engine_id.is_empty() {
            self.google_search(query).await?
        } else {
            self.duckduckgo_search(query).await?
        };

        results.truncate(max_results.max(1));
        for (i, result) in results.iter_mut().enumerate() {
            result.position = i + 1;
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collect_skips_items_without_title_or_url() {
        let items = vec![
            json!({"title": "A", "link": "https://a", "snippet": "sa"}),
            json!({"title": "", "link": "https://b", "snippet": "sb"}),
            json!({"title": "C", "snippet": "sc"}),
        ];
        let results = collect_results(&items, "title", "link", "snippet");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "A");
    }
}
