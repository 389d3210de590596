//! WebSocket streaming of job status events.
//!
//! On connect the handler sends one frame with the job's current snapshot
//! state, then forwards live `StatusEvent`s until the job's stream closes
//! (terminal state) or the client disconnects. There is no history replay.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use tracing::debug;
use uuid::Uuid;

use crowdlens_common::{StatusEvent, StatusEventKind};

use crate::AppState;

/// Close code for an unknown simulation id.
const CLOSE_POLICY_VIOLATION: u16 = 1008;

pub async fn ws_simulation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, id))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, id: Uuid) {
    // Subscribe before reading the snapshot so no transition between the
    // two is lost. A duplicate status frame is harmless; a gap is not.
    let mut rx = match state.registry.subscribe(id) {
        Ok(rx) => rx,
        Err(_) => {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_POLICY_VIOLATION,
                    reason: "unknown simulation".into(),
                })))
                .await;
            return;
        }
    };
    let Ok(snapshot) = state.registry.get(id) else {
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    // Initial frame: current state, so a late subscriber is never blind.
    let hello = StatusEvent {
        job_id: id,
        kind: StatusEventKind::StatusUpdate,
        status: snapshot.status,
        progress: snapshot.progress,
        message: None,
        timestamp: snapshot.updated_at,
    };
    if send_event(&mut socket, &hello).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    if send_event(&mut socket, &event).await.is_err() {
                        debug!(job_id = %id, "WebSocket client went away");
                        return;
                    }
                }
                // Stream closed: the job reached a terminal state.
                None => break,
            },
            inbound = socket.recv() => match inbound {
                // Clients may ping or send keepalive text; ignore both.
                Some(Ok(_)) => {}
                _ => return,
            },
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}

async fn send_event(socket: &mut WebSocket, event: &StatusEvent) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(event).expect("status events always serialize");
    socket.send(Message::Text(payload.into())).await
}
