use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::ChatRequest;
use crate::errors::ApiError;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g. "groq").
    fn name(&self) -> &str;

    /// Check whether the backend is reachable.
    async fn health_check(&self) -> Result<bool, ApiError>;

    /// Chat completion (non-streaming).
    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError>;

    /// Chat completion as a stream of text fragments. Dropping the
    /// receiver abandons the stream; the fragments' concatenation is
    /// the full answer.
    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError>;
}
