use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::embedding::HttpEmbedder;
use crate::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatPayload {
    pub message: String,
}

/// Non-streaming ask: runs the whole retrieve -> compose -> generate
/// turn and returns the final answer with its sources.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<Value>, ApiError> {
    let question = payload.message.trim();
    if question.is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    let settings = state.config.settings()?;
    let provider = state.providers.get_or_build(&settings.generation).await?;

    let result = state
        .session
        .ask(question, provider, &settings.rag, &settings.generation)
        .await?;

    Ok(Json(json!({
        "answer": result.answer,
        "sources": result.sources,
        "failed": result.failed,
    })))
}

pub async fn get_history(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let history = state.session.history().await;
    Ok(Json(json!({ "turns": history })))
}

pub async fn clear_history(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    state.session.clear().await;
    Ok(Json(json!({ "cleared": true })))
}

pub async fn get_sources(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let sources = state.session.last_retrieved().await;
    Ok(Json(json!({ "sources": sources })))
}

/// Explicit rebuild trigger: reloads the corpus and re-embeds when the
/// configuration or corpus snapshot changed; a no-op otherwise.
pub async fn reindex(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let settings = state.config.settings()?;
    let embedder = Arc::new(HttpEmbedder::from_settings(&settings.embedding));
    let documents_dir = settings.rag.resolve_documents_dir(state.config.paths());

    let index = state
        .index
        .get_or_build(
            embedder,
            &documents_dir,
            settings.rag.chunk_size,
            settings.rag.chunk_overlap,
        )
        .await?;

    Ok(Json(json!({
        "chunks": index.len(),
        "embedding_model": index.model(),
    })))
}
