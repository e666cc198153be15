use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::protocol::{WsIncomingMessage, WsOutgoingMessage};
use crate::core::errors::ApiError;
use crate::server::router::allowed_origins;
use crate::session::Session;
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let origin_ok = validate_origin(&headers, &state);
    ws.on_upgrade(move |socket| handle_socket(socket, state, origin_ok))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, origin_ok: bool) {
    let (mut sender, mut receiver) = socket.split();

    if !origin_ok {
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: 4003,
                reason: "Forbidden: Invalid Origin".into(),
            })))
            .await;
        return;
    }

    // one session per connection; queries on it are handled strictly in order
    let connection_id = Uuid::new_v4();
    let mut session = Session::new(state.guide.clone());
    tracing::debug!("Chat connection {} opened", connection_id);
    if send_opening(&mut sender, &state, &session).await.is_err() {
        return;
    }

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let result = match serde_json::from_str::<WsIncomingMessage>(&text) {
                    Ok(incoming) => handle_message(&mut sender, &mut session, incoming).await,
                    Err(err) => Err(ApiError::BadRequest(format!("Invalid message: {}", err))),
                };
                if let Err(err) = result {
                    let message = WsOutgoingMessage::Error {
                        message: err.to_string(),
                    };
                    if send_json(&mut sender, &message).await.is_err() {
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    tracing::debug!(
        "Chat connection {} closed after {} turns",
        connection_id,
        session.transcript().len()
    );
}

async fn send_opening(
    sender: &mut SplitSink<WebSocket, Message>,
    state: &AppState,
    session: &Session,
) -> Result<(), ApiError> {
    send_history(sender, session).await?;
    if let Some(message) = state.guide.banner() {
        send_json(sender, &WsOutgoingMessage::Banner { message }).await?;
    }
    Ok(())
}

async fn handle_message(
    sender: &mut SplitSink<WebSocket, Message>,
    session: &mut Session,
    data: WsIncomingMessage,
) -> Result<(), ApiError> {
    match data.msg_type.as_deref().unwrap_or("query") {
        "reset" => {
            session.on_session_start();
            send_history(sender, session).await
        }
        "query" => {
            let query = data.message.unwrap_or_default();
            let show_secondary = data.show_secondary.unwrap_or(false);
            answer(sender, session, query, show_secondary).await
        }
        other => Err(ApiError::BadRequest(format!(
            "Unknown message type '{}'",
            other
        ))),
    }
}

/// Runs the query while forwarding its events to the socket as they arrive.
async fn answer(
    sender: &mut SplitSink<WebSocket, Message>,
    session: &mut Session,
    query: String,
    show_secondary: bool,
) -> Result<(), ApiError> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let run = async move {
        let outcome = session
            .on_query(&query, show_secondary, &tx)
            .await
            .map(|_| ());
        drop(tx);
        outcome
    };

    let forward = async {
        let mut delivered = Ok(());
        while let Some(event) = rx.recv().await {
            if delivered.is_ok() {
                delivered = send_json(sender, &WsOutgoingMessage::from(event)).await;
            }
        }
        delivered
    };

    let (outcome, delivered) = tokio::join!(run, forward);
    delivered?;
    Ok(outcome?)
}

async fn send_history(
    sender: &mut SplitSink<WebSocket, Message>,
    session: &Session,
) -> Result<(), ApiError> {
    let message = WsOutgoingMessage::History {
        messages: session.transcript().to_vec(),
    };
    send_json(sender, &message).await
}

pub async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    payload: &WsOutgoingMessage,
) -> Result<(), ApiError> {
    let text = serde_json::to_string(payload).map_err(ApiError::internal)?;
    sender
        .send(Message::Text(text))
        .await
        .map_err(ApiError::internal)?;
    Ok(())
}

/// Browsers must present an allowed origin; clients that send none are let through.
fn validate_origin(headers: &HeaderMap, state: &AppState) -> bool {
    let Some(origin) = headers.get("origin").and_then(|v| v.to_str().ok()) else {
        return true;
    };

    allowed_origins(&state.settings.server)
        .iter()
        .any(|allowed| origin == allowed || origin.starts_with(&format!("{}/", allowed)))
}
