use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::errors::ApiError;
use crate::state::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let settings = state.config.settings()?;
    let index = state.index.status().await;
    let phase = state.session.phase().await;
    let history_len = state.session.history_len().await;

    Ok(Json(json!({
        "phase": phase,
        "history_length": history_len,
        "index": index,
        "generation_model": settings.generation.model,
        "embedding_model": settings.embedding.model,
        "started_at": state.started_at.to_rfc3339(),
    })))
}
