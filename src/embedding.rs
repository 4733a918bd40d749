//! Embedding backend client.
//!
//! Any OpenAI-compatible `/v1/embeddings` endpoint works: a local
//! llama.cpp or LM Studio server, or a hosted API. The backend is a
//! black box that maps text to a fixed-size vector, stable for a fixed
//! input.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::EmbeddingSettings;
use crate::errors::ApiError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier; part of the index cache key.
    fn model(&self) -> &str;

    /// Embed each input, output order matching input order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}

#[derive(Clone)]
pub struct HttpEmbedder {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpEmbedder {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            client: Client::new(),
        }
    }

    pub fn from_settings(settings: &EmbeddingSettings) -> Self {
        Self::new(
            &settings.base_url,
            &settings.model,
            settings.api_key.clone(),
        )
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let mut request = self.client.post(url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                ApiError::Timeout
            } else {
                ApiError::upstream(err)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "embedding request failed: {} {}",
                status, text
            )));
        }

        let payload: Value = response.json().await.map_err(ApiError::upstream)?;
        parse_embedding_response(&payload)
    }
}

/// Pull the vectors out of an OpenAI-style embeddings payload, restoring
/// input order from the per-item `index` field.
fn parse_embedding_response(payload: &Value) -> Result<Vec<Vec<f32>>, ApiError> {
    let Some(data) = payload.get("data").and_then(|v| v.as_array()) else {
        return Err(ApiError::Upstream(
            "embedding response missing data array".to_string(),
        ));
    };

    let mut indexed = Vec::with_capacity(data.len());
    for (fallback_idx, item) in data.iter().enumerate() {
        let Some(values) = item.get("embedding").and_then(|v| v.as_array()) else {
            return Err(ApiError::Upstream(
                "embedding response item missing embedding array".to_string(),
            ));
        };

        let mut embedding = Vec::with_capacity(values.len());
        for value in values {
            let Some(float_value) = value.as_f64() else {
                return Err(ApiError::Upstream(
                    "embedding contains non-numeric value".to_string(),
                ));
            };
            embedding.push(float_value as f32);
        }

        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(fallback_idx);
        indexed.push((index, embedding));
    }

    indexed.sort_by_key(|(idx, _)| *idx);
    Ok(indexed.into_iter().map(|(_, embedding)| embedding).collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_embedding_response;

    #[test]
    fn parse_embedding_response_preserves_input_order_by_index() {
        let payload = json!({
            "data": [
                {"index": 1, "embedding": [0.3, 0.4]},
                {"index": 0, "embedding": [0.1, 0.2]}
            ]
        });

        let parsed = parse_embedding_response(&payload).expect("embedding payload should parse");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], vec![0.1_f32, 0.2_f32]);
        assert_eq!(parsed[1], vec![0.3_f32, 0.4_f32]);
    }

    #[test]
    fn parse_embedding_response_rejects_missing_data() {
        let payload = json!({"error": "nope"});
        assert!(parse_embedding_response(&payload).is_err());
    }

    #[test]
    fn parse_embedding_response_rejects_non_numeric_values() {
        let payload = json!({
            "data": [{"index": 0, "embedding": [0.1, "oops"]}]
        });
        assert!(parse_embedding_response(&payload).is_err());
    }
}
