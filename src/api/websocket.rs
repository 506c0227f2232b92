use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::api::state::AppState;
use crate::hub::{ClientMessage, ConnectionId, Envelope, Hub, OutboundMessage};

/// WebSocket handler for the notification hub
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (outbox, mut inbox) = mpsc::channel::<Envelope>(state.outbox_capacity);
    let id = state.hub.register(outbox);

    // Drain this connection's outbox into the socket. Ends when the hub
    // drops the sender (unregister/eviction) or the socket write fails.
    let mut send_task = tokio::spawn(async move {
        while let Some(envelope) = inbox.recv().await {
            let json = match serde_json::to_string(&envelope) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize WebSocket message: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let hub = state.hub.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => apply_client_frame(&hub, id, &text),
                Message::Close(_) => break,
                // Axum answers pings itself
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.unregister(id);
    info!(connection_id = %id, "WebSocket connection closed");
}

/// Apply one client text frame to the hub. Frames that cannot be parsed
/// get an `error` reply on the same connection.
pub fn apply_client_frame(hub: &Hub, id: ConnectionId, text: &str) {
    match ClientMessage::parse(text) {
        Ok(ClientMessage::Subscribe { channel }) => hub.subscribe(id, &channel),
        Ok(ClientMessage::Unsubscribe { channel }) => hub.unsubscribe(id, &channel),
        Ok(ClientMessage::Authenticate { user_id }) => hub.authenticate(id, &user_id),
        Err(e) => {
            debug!(connection_id = %id, error = %e, "rejected client frame");
            hub.send_to_connection(id, OutboundMessage::rejected(&e.to_string()));
        }
    }
}
