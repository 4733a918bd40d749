//! Hosted chat backend over the OpenAI-compatible Groq API.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::config::GenerationSettings;
use crate::errors::ApiError;

#[derive(Clone)]
pub struct GroqProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl GroqProvider {
    pub fn new(settings: &GenerationSettings) -> Result<Self, ApiError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ApiError::Unauthorized)?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
            client: Client::new(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn request_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": stream,
        });
        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
        }
        body
    }
}

#[async_trait]
impl LlmProvider for GroqProvider {
    fn name(&self) -> &str {
        "groq"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let url = format!("{}/v1/models", self.base_url);
        let res = self.client.get(&url).bearer_auth(&self.api_key).send().await;
        match res {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        let body = self.request_body(&request, false);

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &text));
        }

        let payload: Value = response.json().await.map_err(ApiError::upstream)?;
        payload
            .get("choices")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ApiError::Upstream("malformed completion response".to_string()))
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let body = self.request_body(&request, true);

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &text));
        }

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));

                        // SSE events may split across network chunks;
                        // only consume completed lines.
                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].trim().to_string();
                            buffer.drain(..pos + 1);
                            if line.is_empty() {
                                continue;
                            }
                            let Some(payload) = line.strip_prefix("data:") else {
                                continue;
                            };
                            let data = payload.trim();
                            if data == "[DONE]" {
                                return;
                            }
                            if let Ok(value) = serde_json::from_str::<Value>(data) {
                                if let Some(delta) = extract_delta(&value) {
                                    if !delta.is_empty() && tx.send(Ok(delta)).await.is_err() {
                                        // Receiver dropped: stream abandoned.
                                        return;
                                    }
                                }
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(map_transport_error(err))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

fn map_transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::upstream(err)
    }
}

fn map_status_error(status: StatusCode, body: &str) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited,
        _ => ApiError::Upstream(format!("chat request failed: {} {}", status, body)),
    }
}

fn extract_delta(payload: &Value) -> Option<String> {
    let choice = payload
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first());
    if let Some(content) = choice
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|v| v.as_str())
    {
        return Some(content.to_string());
    }
    if let Some(content) = choice
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
    {
        return Some(content.to_string());
    }
    choice
        .and_then(|c| c.get("text"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn extract_delta_reads_streaming_content() {
        let payload = json!({
            "choices": [{"delta": {"content": "Hello"}}]
        });
        assert_eq!(extract_delta(&payload), Some("Hello".to_string()));
    }

    #[test]
    fn extract_delta_falls_back_to_message_content() {
        let payload = json!({
            "choices": [{"message": {"content": "full answer"}}]
        });
        assert_eq!(extract_delta(&payload), Some("full answer".to_string()));
    }

    #[test]
    fn extract_delta_returns_none_without_choices() {
        assert_eq!(extract_delta(&json!({"object": "ping"})), None);
    }

    #[test]
    fn status_errors_are_distinguishable() {
        assert!(matches!(
            map_status_error(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            map_status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
        assert!(matches!(
            map_status_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            ApiError::Upstream(_)
        ));
    }

    #[test]
    fn provider_requires_api_key() {
        let settings = GenerationSettings {
            api_key: None,
            ..GenerationSettings::default()
        };
        assert!(matches!(
            GroqProvider::new(&settings),
            Err(ApiError::Unauthorized)
        ));
    }
}
