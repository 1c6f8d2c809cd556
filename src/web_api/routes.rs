//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};

use crate::liveview::types::ControlPayload;
use crate::mjpeg;
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(super::health_check))
        .route("/stream", get(stream_handler))
        .route("/control", get(control_handler))
        .route("/mjpeg", get(mjpeg_handler))
        .route("/snapshot", get(snapshot_handler))
        .with_state(state)
}

// ========================================
// Stream (WebSocket, server -> client frames)
// ========================================

async fn stream_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_socket(socket, state))
}

async fn stream_socket(socket: WebSocket, state: AppState) {
    let (id, mut frames) = state.lv.register_stream_client().await;
    let (mut sink, mut reader) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(msg) = frames.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Inbound messages are keep-alives; any read error means disconnect.
    while let Some(msg) = reader.next().await {
        if let Err(e) = msg {
            tracing::debug!(client_id = %id, error = %e, "stream: failed to read a message");
            break;
        }
    }

    state.lv.unregister_stream_client(&id).await;
    writer.abort();
}

// ========================================
// Control (WebSocket, bidirectional JSON)
// ========================================

async fn control_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| control_socket(socket, state))
}

async fn control_socket(socket: WebSocket, state: AppState) {
    let (id, mut snapshots) = state.lv.register_control_client().await;
    let (mut sink, mut reader) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(msg) = snapshots.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = reader.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(client_id = %id, error = %e, "control: failed to read a message");
                break;
            }
        };

        let payload: ControlPayload = match serde_json::from_str(&text) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(client_id = %id, error = %e, "control: malformed message");
                break;
            }
        };

        state.lv.apply_control(payload).await;
    }

    state.lv.unregister_control_client(&id).await;
    writer.abort();
}

// ========================================
// MJPEG / Snapshot
// ========================================

async fn mjpeg_handler(State(state): State<AppState>) -> Response {
    tracing::info!("handling GET /mjpeg");

    let (id, tx, rx) = state.lv.register_motion_client().await;

    // The receiver closing is the disconnect signal.
    let lv = state.lv.clone();
    tokio::spawn(async move {
        tx.closed().await;
        lv.unregister_motion_client(&id).await;
    });

    mjpeg::into_response(rx)
}

async fn snapshot_handler(State(state): State<AppState>) -> Response {
    match state.lv.snapshot().await {
        Some(jpeg) if !jpeg.is_empty() => {
            ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response()
        }
        _ => StatusCode::NO_CONTENT.into_response(),
    }
}
