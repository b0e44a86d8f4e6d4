//! WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use boardsync_protocol::ServerMessage;

use crate::app::AppState;
use crate::hub::BroadcastHub;

/// Identity hints supplied at handshake. Unverified — authentication is
/// out of scope for this layer.
#[derive(Debug, serde::Deserialize)]
pub struct WsQuery {
    /// Stable user id; a fresh one is generated when absent.
    pub user_id: Option<String>,
}

/// GET /ws?user_id={id} — WebSocket upgrade
pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_ws_connection(state.hub, query, socket))
}

/// Handles an established WebSocket connection.
async fn handle_ws_connection(hub: Arc<BroadcastHub>, query: WsQuery, socket: WebSocket) {
    let user_id = query
        .user_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (handle, mut outbound_rx) = hub.register(&user_id);
    let conn_id = handle.id;

    let (mut ws_tx, mut ws_rx) = socket.split();

    hub.unicast(
        &handle,
        &ServerMessage::ConnectionEstablished {
            client_id: conn_id.to_string(),
        },
    );

    // Outbound pump: per-connection queue → socket.
    let outbound_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(Message::Text(text)) => {
                hub.handle_inbound(&conn_id, &text);
            }
            Ok(Message::Close(_)) => {
                break;
            }
            // Protocol-level ping/pong is answered by axum.
            Ok(_) => {}
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    outbound_task.abort();
    hub.unregister(&conn_id);

    info!(
        conn_id = %conn_id,
        user_id = %user_id,
        "WebSocket connection closed"
    );
}
