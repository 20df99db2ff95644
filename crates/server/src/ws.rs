//! WebSocket handler: connection lifecycle and command dispatch.

use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use patter_shared::{ClientCommand, ServerEvent, WsEnvelope};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::presence::ConnectionHandle;
use crate::state::AppState;

/// WebSocket upgrade handler.
///
/// The handshake carries the caller's identity as a `userId` query parameter
/// so the presence registry can be populated before the first event.
/// Identity issuance itself is the auth collaborator's concern.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Result<Response, (StatusCode, String)> {
    let user_id = params
        .get("userId")
        .filter(|id| !id.is_empty())
        .cloned()
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "missing userId query parameter".to_string(),
            )
        })?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user_id, state)))
}

/// Drive one connection: register it, forward outbound events, dispatch
/// inbound commands, and tear everything down on close.
async fn handle_socket(socket: WebSocket, user_id: String, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id = Uuid::new_v4();

    let (forward_tx, mut forward_rx) = mpsc::unbounded_channel::<WsEnvelope<ServerEvent>>();
    let handle = ConnectionHandle::new(conn_id, forward_tx);

    // Registration broadcasts the new online snapshot to everyone,
    // this connection included.
    state.registry.register(&user_id, handle.clone()).await;

    // Forward task: per-connection unbounded queue keeps delivery FIFO
    // without ever blocking a routing call on a slow peer.
    let send_task = tokio::spawn(async move {
        while let Some(event) = forward_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("failed to serialize event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<WsEnvelope<ClientCommand>>(&text)
            {
                Ok(envelope) => {
                    dispatch_command(envelope.payload, &user_id, &handle, &state).await;
                }
                Err(e) => {
                    tracing::warn!(user_id, "ignoring malformed command: {}", e);
                }
            },
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    state.rooms.leave_all(conn_id).await;
    state.registry.unregister(&user_id, conn_id).await;
}

async fn dispatch_command(
    command: ClientCommand,
    user_id: &str,
    handle: &ConnectionHandle,
    state: &AppState,
) {
    match command {
        ClientCommand::JoinGroup { group_id } => {
            state.rooms.join(&group_id, handle.clone()).await;
        }
        ClientCommand::LeaveGroup { group_id } => {
            state.rooms.leave(&group_id, handle.conn_id).await;
        }
        call @ (ClientCommand::CallUser { .. }
        | ClientCommand::AnswerCall { .. }
        | ClientCommand::IceCandidate { .. }
        | ClientCommand::EndCall { .. }) => {
            state.relay.forward(user_id, call).await;
        }
    }
}
