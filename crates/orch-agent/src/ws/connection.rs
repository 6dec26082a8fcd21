use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::debug;

use crate::app::AppState;

/// Upgrades to a websocket and bridges it onto the registered
/// `WsFrontend`: inbound text frames are handed to
/// `WsFrontend::handle_inbound_text`, outbound frames arrive pre-serialized
/// on the receiver `WsFrontend::register_connection` returns and are
/// forwarded to the socket verbatim — no handshake, no method dispatch,
/// the wire contract is the bare `{chat_id, content, is_respond,
/// timestamp}` frame.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (conn_id, mut outbound) = state.ws_frontend.register_connection();

    let forward = tokio::spawn(async move {
        while let Some(payload) = outbound.recv().await {
            if sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => state.ws_frontend.handle_inbound_text(&text).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.ws_frontend.unregister_connection(conn_id);
    forward.abort();
    debug!(conn_id = %conn_id, "websocket connection closed");
}
