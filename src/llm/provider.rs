use async_trait::async_trait;
use serde_json::Value;

use super::types::ChatRequest;
use crate::core::errors::ApiError;

/// Abstraction over the embedding/completion provider.
///
/// The core treats the provider as a black box: text in, text (or one JSON
/// object, or vectors) out. Failures propagate as `ApiError::Upstream`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logs (e.g. "openai").
    fn name(&self) -> &str;

    /// Chat completion returning the assistant message content.
    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError>;

    /// Chat completion that must return a single JSON object.
    ///
    /// A response that does not parse as a JSON object is a hard error,
    /// never silently defaulted.
    async fn chat_json(&self, request: ChatRequest) -> Result<Value, ApiError>;

    /// Generate embeddings, one vector per input.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}
