//! WebSocket chat channel: fragments stream out as they arrive, and a
//! `stop` message abandons the in-flight generation.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::server::ws::protocol::WsIncomingMessage;
use crate::session::StreamEvent;
use crate::state::AppState;

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    while let Some(Ok(message)) = receiver.next().await {
        let Message::Text(text) = message else {
            continue;
        };

        let incoming: WsIncomingMessage = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(err) => {
                let payload = json!({"type": "error", "message": format!("invalid message: {err}")});
                if send_json(&mut sender, payload).await.is_err() {
                    return;
                }
                continue;
            }
        };

        let result = match incoming.msg_type.as_deref() {
            Some("chat") => handle_chat(&mut sender, &mut receiver, &state, incoming).await,
            Some("history") => {
                let history = state.session.history().await;
                send_json(&mut sender, json!({"type": "history", "turns": history})).await
            }
            Some("clear") => {
                state.session.clear().await;
                send_json(&mut sender, json!({"type": "cleared"})).await
            }
            Some("stop") => {
                // Nothing in flight outside handle_chat; acknowledge.
                send_json(&mut sender, json!({"type": "stopped"})).await
            }
            other => {
                let payload = json!({
                    "type": "error",
                    "message": format!("unknown message type: {}", other.unwrap_or("none")),
                });
                send_json(&mut sender, payload).await
            }
        };

        if result.is_err() {
            return;
        }
    }
}

async fn handle_chat(
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
    state: &Arc<AppState>,
    incoming: WsIncomingMessage,
) -> Result<(), axum::Error> {
    let request_id = incoming
        .request_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let question = incoming.message.unwrap_or_default();
    let question = question.trim();
    if question.is_empty() {
        return send_json(
            sender,
            json!({"type": "error", "requestId": request_id, "message": "message must not be empty"}),
        )
        .await;
    }

    let settings = match state.config.settings() {
        Ok(settings) => settings,
        Err(err) => {
            return send_json(
                sender,
                json!({"type": "error", "requestId": request_id, "message": err.to_string()}),
            )
            .await;
        }
    };

    let provider = match state.providers.get_or_build(&settings.generation).await {
        Ok(provider) => provider,
        Err(err) => {
            return send_json(
                sender,
                json!({"type": "error", "requestId": request_id, "message": err.to_string()}),
            )
            .await;
        }
    };

    let mut stream = match state
        .session
        .ask_streaming(question, provider, &settings.rag, &settings.generation)
        .await
    {
        Ok(stream) => stream,
        Err(err) => {
            return send_json(
                sender,
                json!({"type": "error", "requestId": request_id, "message": err.to_string()}),
            )
            .await;
        }
    };

    send_json(
        sender,
        json!({"type": "sources", "requestId": request_id, "data": stream.sources}),
    )
    .await?;

    loop {
        tokio::select! {
            event = stream.events.recv() => match event {
                Some(StreamEvent::Fragment(fragment)) => {
                    send_json(
                        sender,
                        json!({"type": "chunk", "requestId": request_id, "data": fragment}),
                    )
                    .await?;
                }
                Some(StreamEvent::Done { answer }) => {
                    send_json(
                        sender,
                        json!({"type": "done", "requestId": request_id, "answer": answer}),
                    )
                    .await?;
                    break;
                }
                Some(StreamEvent::Failed { message }) => {
                    send_json(
                        sender,
                        json!({"type": "error", "requestId": request_id, "message": message}),
                    )
                    .await?;
                    send_json(sender, json!({"type": "done", "requestId": request_id})).await?;
                    break;
                }
                None => break,
            },
            control = receiver.next() => match control {
                Some(Ok(Message::Text(text))) => {
                    let parsed: WsIncomingMessage =
                        serde_json::from_str(&text).unwrap_or_default();
                    if parsed.msg_type.as_deref() == Some("stop") {
                        send_json(sender, json!({"type": "stopped", "requestId": request_id}))
                            .await?;
                        // Returning drops the stream and abandons the
                        // generation; partial text is discarded.
                        return Ok(());
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => {
                    // Client went away; the dropped stream cancels work.
                    return Ok(());
                }
            }
        }
    }

    Ok(())
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    payload: Value,
) -> Result<(), axum::Error> {
    sender.send(Message::Text(payload.to_string())).await
}
