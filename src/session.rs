//! Session controller: one conversation, one request in flight.
//!
//! Orchestrates retrieval, prompt composition, and generation for each
//! question, and owns the conversation history plus the most recent
//! retrieval results for the display layer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{timeout, Duration};

use crate::config::{GenerationSettings, RagSettings};
use crate::errors::ApiError;
use crate::index::{IndexService, RetrievedChunk};
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use crate::prompt;

/// Assistant reply recorded when generation fails; the failed turn is
/// kept in history so the transcript stays consistent.
pub const GENERATION_FAILURE_REPLY: &str =
    "I encountered an error. Please check your API key or try again.";

/// A generation stream that stops producing fragments for this long is
/// treated as failed so the session cannot wedge mid-turn.
const STREAM_STALL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Retrieving,
    Composing,
    Generating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub enum StreamEvent {
    Fragment(String),
    Done { answer: String },
    Failed { message: String },
}

/// Handle to one in-flight answer. Dropping `events` abandons the
/// generation; accumulated partial text is discarded and no assistant
/// turn is recorded.
pub struct AnswerStream {
    pub sources: Vec<RetrievedChunk>,
    pub events: mpsc::Receiver<StreamEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResult {
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
    pub failed: bool,
}

struct SessionState {
    history: Vec<Turn>,
    last_retrieved: Vec<RetrievedChunk>,
    phase: Phase,
}

pub struct SessionController {
    index: Arc<IndexService>,
    state: Arc<Mutex<SessionState>>,
}

impl SessionController {
    pub fn new(index: Arc<IndexService>) -> Self {
        Self {
            index,
            state: Arc::new(Mutex::new(SessionState {
                history: Vec::new(),
                last_retrieved: Vec::new(),
                phase: Phase::Idle,
            })),
        }
    }

    pub async fn history(&self) -> Vec<Turn> {
        self.state.lock().await.history.clone()
    }

    pub async fn last_retrieved(&self) -> Vec<RetrievedChunk> {
        self.state.lock().await.last_retrieved.clone()
    }

    pub async fn phase(&self) -> Phase {
        self.state.lock().await.phase
    }

    pub async fn history_len(&self) -> usize {
        self.state.lock().await.history.len()
    }

    /// Drop history and last-retrieved chunks. The phase is untouched;
    /// an in-flight turn finishes against the cleared transcript.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.history.clear();
        state.last_retrieved.clear();
    }

    /// Answer one question, streaming fragments to the caller.
    ///
    /// Retrieval failures degrade to an empty context; generation
    /// failures record the placeholder turn. Only a second concurrent
    /// request is refused outright.
    pub async fn ask_streaming(
        &self,
        question: &str,
        provider: Arc<dyn LlmProvider>,
        rag: &RagSettings,
        gen: &GenerationSettings,
    ) -> Result<AnswerStream, ApiError> {
        {
            let mut state = self.state.lock().await;
            if state.phase != Phase::Idle {
                return Err(ApiError::BadRequest(
                    "another request is already in flight".to_string(),
                ));
            }
            state.phase = Phase::Retrieving;
            state.history.push(Turn::user(question));
            trim_history(&mut state.history, rag.max_turns);
        }

        let retrieved = match self.retrieve(question, rag.top_k).await {
            Ok(chunks) => chunks,
            Err(err) => {
                tracing::warn!("Retrieval failed, continuing with empty context: {err}");
                Vec::new()
            }
        };

        {
            let mut state = self.state.lock().await;
            state.last_retrieved = retrieved.clone();
            state.phase = Phase::Composing;
        }

        let texts: Vec<String> = retrieved.iter().map(|c| c.text.clone()).collect();
        let full_prompt = prompt::compose(question, &texts);
        let request = ChatRequest::new(vec![ChatMessage::user(full_prompt)]).with_generation(gen);

        {
            self.state.lock().await.phase = Phase::Generating;
        }

        let (out_tx, out_rx) = mpsc::channel(64);

        match provider.stream_chat(request).await {
            Ok(mut fragments) => {
                let state = self.state.clone();
                let max_turns = rag.max_turns;
                tokio::spawn(async move {
                    let mut answer = String::new();
                    loop {
                        match timeout(STREAM_STALL_TIMEOUT, fragments.recv()).await {
                            Ok(Some(Ok(fragment))) => {
                                answer.push_str(&fragment);
                                if out_tx.send(StreamEvent::Fragment(fragment)).await.is_err() {
                                    // Caller abandoned the stream: discard
                                    // partial text, record nothing.
                                    set_idle(&state).await;
                                    return;
                                }
                            }
                            Ok(Some(Err(err))) => {
                                tracing::error!("Generation failed: {err}");
                                record_failure(&state, max_turns).await;
                                let _ = out_tx
                                    .send(StreamEvent::Failed {
                                        message: GENERATION_FAILURE_REPLY.to_string(),
                                    })
                                    .await;
                                return;
                            }
                            Ok(None) => {
                                record_answer(&state, answer.clone(), max_turns).await;
                                let _ = out_tx.send(StreamEvent::Done { answer }).await;
                                return;
                            }
                            Err(_) => {
                                tracing::error!("Generation stalled, giving up on this turn");
                                record_failure(&state, max_turns).await;
                                let _ = out_tx
                                    .send(StreamEvent::Failed {
                                        message: GENERATION_FAILURE_REPLY.to_string(),
                                    })
                                    .await;
                                return;
                            }
                        }
                    }
                });
            }
            Err(err) => {
                tracing::error!("Generation request failed: {err}");
                record_failure(&self.state, rag.max_turns).await;
                let _ = out_tx
                    .send(StreamEvent::Failed {
                        message: GENERATION_FAILURE_REPLY.to_string(),
                    })
                    .await;
            }
        }

        Ok(AnswerStream {
            sources: retrieved,
            events: out_rx,
        })
    }

    /// Answer one question and wait for the full text.
    pub async fn ask(
        &self,
        question: &str,
        provider: Arc<dyn LlmProvider>,
        rag: &RagSettings,
        gen: &GenerationSettings,
    ) -> Result<AskResult, ApiError> {
        let mut stream = self.ask_streaming(question, provider, rag, gen).await?;

        let mut answer = String::new();
        let mut failed = false;
        while let Some(event) = stream.events.recv().await {
            match event {
                StreamEvent::Fragment(_) => {}
                StreamEvent::Done { answer: full } => answer = full,
                StreamEvent::Failed { message } => {
                    answer = message;
                    failed = true;
                }
            }
        }

        Ok(AskResult {
            answer,
            sources: stream.sources,
            failed,
        })
    }

    async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, ApiError> {
        let (embedder, index) = self
            .index
            .current()
            .await
            .ok_or(ApiError::ServiceUnavailable)?;

        let mut embeddings = embedder.embed(&[question.to_string()]).await?;
        if embeddings.is_empty() {
            return Err(ApiError::Upstream(
                "embedding backend returned no vector for the query".to_string(),
            ));
        }
        let query = embeddings.remove(0);

        Ok(index.search(&query, top_k))
    }
}

async fn set_idle(state: &Mutex<SessionState>) {
    state.lock().await.phase = Phase::Idle;
}

async fn record_answer(state: &Mutex<SessionState>, answer: String, max_turns: usize) {
    let mut guard = state.lock().await;
    guard.history.push(Turn::assistant(answer));
    trim_history(&mut guard.history, max_turns);
    guard.phase = Phase::Idle;
}

async fn record_failure(state: &Mutex<SessionState>, max_turns: usize) {
    let mut guard = state.lock().await;
    guard.history.push(Turn::assistant(GENERATION_FAILURE_REPLY));
    trim_history(&mut guard.history, max_turns);
    guard.phase = Phase::Idle;
}

/// Keep the newest `2 * max_turns` entries, dropping from the front.
fn trim_history(history: &mut Vec<Turn>, max_turns: usize) {
    let cap = max_turns * 2;
    if history.len() > cap {
        let excess = history.len() - cap;
        history.drain(..excess);
    }
}
