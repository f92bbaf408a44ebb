use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::SinkExt;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::connections::Role;
use crate::engine::dispatch::record_connections;
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/rider/:id", get(rider_ws_handler))
        .route("/ws/driver/:id", get(driver_ws_handler))
}

pub async fn rider_ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let id = super::parse_id("rider", &id)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, Role::Rider, id)))
}

pub async fn driver_ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let id = super::parse_id("driver", &id)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, Role::Driver, id)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, role: Role, id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let connection_id = state.connections.register(role, id, event_tx);
    record_connections(&state, role);

    info!(%role, %id, "live channel connected");

    let mut events = UnboundedReceiverStream::new(event_rx);
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Clients have nothing to say; reading only detects closure.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.connections.unregister_connection(role, id, connection_id);
    record_connections(&state, role);

    info!(%role, %id, "live channel disconnected");
}
