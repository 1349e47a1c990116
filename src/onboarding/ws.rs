//! WebSocket endpoint for the onboarding conversation.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use tracing::{debug, info, warn};

use super::engine::ConversationEngine;
use super::model::{ClientMessage, ServerMessage};
use crate::error::ConversationError;

/// Build the `/ws` route.
pub fn ws_routes(engine: Arc<ConversationEngine>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(engine)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(engine): State<Arc<ConversationEngine>>,
) -> impl IntoResponse {
    info!("WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, engine))
}

/// One connection, one session binding. Frames are handled strictly in
/// arrival order: the next frame is not read until the previous reply is sent.
async fn handle_socket(mut socket: WebSocket, engine: Arc<ConversationEngine>) {
    info!("WebSocket client connected");
    let mut session_id: Option<String> = None;

    while let Some(result) = socket.recv().await {
        match result {
            Ok(Message::Text(text)) => {
                let reply = handle_frame(&engine, &mut session_id, &text).await;
                if !send_reply(&mut socket, &reply).await {
                    break;
                }
            }
            Ok(Message::Binary(data)) => {
                debug!(session_id = ?session_id, len = data.len(), "Binary frame rejected");
                let err = ConversationError::MalformedMessage("binary frame".to_string());
                if !send_reply(&mut socket, &ServerMessage::error(err.client_message())).await {
                    break;
                }
            }
            Ok(Message::Ping(data)) => {
                if socket.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                info!(session_id = ?session_id, "WebSocket client disconnected");
                break;
            }
            Err(e) => {
                warn!(error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    info!(session_id = ?session_id, "WebSocket connection closed");
}

/// Returns false once the client is gone.
async fn send_reply(socket: &mut WebSocket, reply: &ServerMessage) -> bool {
    let json = match serde_json::to_string(reply) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize reply");
            return true;
        }
    };
    if socket.send(Message::Text(json.into())).await.is_err() {
        debug!("Client disconnected during send");
        return false;
    }
    true
}

/// Turn boundary: every failure becomes an `error` frame and the
/// connection stays open.
async fn handle_frame(
    engine: &ConversationEngine,
    session_id: &mut Option<String>,
    text: &str,
) -> ServerMessage {
    let result = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => engine.handle(session_id, message).await,
        Err(e) => Err(ConversationError::MalformedMessage(e.to_string())),
    };

    result.unwrap_or_else(|e| {
        match &e {
            ConversationError::Store(_) => {
                warn!(session_id = ?session_id, error = %e, "Turn failed on store access")
            }
            _ => debug!(session_id = ?session_id, error = %e, "Turn rejected"),
        }
        ServerMessage::error(e.client_message())
    })
}
