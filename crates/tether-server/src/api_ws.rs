//! WebSocket endpoints for the location broadcast protocol.
//!
//! Two connection roles share nothing but the session registry:
//!
//! - **Writer** (`/ws/subject/{subjectId}`): the subject's device streams
//!   position reports, fire-and-forget. At most one writer per subject;
//!   a second connection is closed with a policy code.
//! - **Reader** (`/ws/track/{subjectId}`): pull-paced push. The server
//!   sends the current view, then blocks until the client acknowledges
//!   with any frame before producing the next one. The reader therefore
//!   controls its own refresh rate, and no historical samples are ever
//!   queued — each push is the latest state at that moment.
//!
//! Every exit from a writer loop — graceful close, malformed frame,
//! transport error — funnels into the same single detach call, so the
//! session slot is always released exactly once.

use crate::AppState;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message as WsMessage, WebSocket},
        Extension, Path, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tether_session::{SessionError, SessionView};
use tether_types::GeoPosition;

/// A position report from the subject's device.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PositionReport {
    pub latitude: f64,
    pub longitude: f64,
}

/// Frames pushed to reader connections.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum TrackFrame {
    /// The subject's current liveness and position.
    #[serde(rename = "update")]
    Update(SessionView),
    /// The subject record was deleted; there is nothing to track.
    #[serde(rename = "subject_not_found")]
    SubjectNotFound { subject_id: String },
}

/// `GET /ws/subject/{subjectId}` — writer role.
pub async fn writer_ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(subject_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_writer_socket(socket, state, subject_id))
}

/// `GET /ws/track/{subjectId}` — reader role.
pub async fn reader_ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(subject_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_reader_socket(socket, state, subject_id))
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(WsMessage::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

async fn handle_writer_socket(mut socket: WebSocket, state: Arc<AppState>, subject_id: String) {
    let writer_id = match state.registry.attach_writer(&subject_id).await {
        Ok(id) => id,
        Err(SessionError::WriterAlreadyAttached(_)) => {
            tracing::info!(subject_id = %subject_id, "rejecting second writer connection");
            close_with(socket, close_code::POLICY, "writer already attached").await;
            return;
        }
        Err(SessionError::SubjectNotFound(_)) => {
            tracing::info!(subject_id = %subject_id, "writer connect for unknown subject");
            close_with(socket, close_code::POLICY, "unknown subject").await;
            return;
        }
        Err(e) => {
            tracing::error!(subject_id = %subject_id, "writer attach failed: {}", e);
            close_with(socket, close_code::ERROR, "internal error").await;
            return;
        }
    };

    while let Some(Ok(message)) = socket.recv().await {
        match message {
            WsMessage::Text(text) => {
                let report: PositionReport = match serde_json::from_str(&text) {
                    Ok(report) => report,
                    Err(e) => {
                        tracing::warn!(
                            subject_id = %subject_id,
                            "malformed position report, closing writer: {}",
                            e
                        );
                        break;
                    }
                };
                // Fire-and-forget: the writer gets no per-report ack, and
                // a failed persist must not kill the stream.
                if let Err(e) = state
                    .registry
                    .report_position(
                        &subject_id,
                        GeoPosition {
                            latitude: report.latitude,
                            longitude: report.longitude,
                        },
                    )
                    .await
                {
                    tracing::warn!(subject_id = %subject_id, "failed to record position: {}", e);
                }
            }
            WsMessage::Close(_) => break,
            // Pings are answered by axum; binary frames are ignored.
            _ => {}
        }
    }

    // Single exit path: runs for graceful closes, malformed frames, and
    // transport errors alike.
    if let Err(e) = state.registry.detach_writer(&subject_id, writer_id).await {
        tracing::warn!(subject_id = %subject_id, "writer detach failed: {}", e);
    }
}

async fn handle_reader_socket(mut socket: WebSocket, state: Arc<AppState>, subject_id: String) {
    loop {
        let frame = match state.registry.current_view(&subject_id).await {
            Ok(Some(view)) => TrackFrame::Update(view),
            Ok(None) => TrackFrame::SubjectNotFound {
                subject_id: subject_id.clone(),
            },
            Err(e) => {
                tracing::error!(subject_id = %subject_id, "current view failed: {}", e);
                break;
            }
        };

        let payload = match serde_json::to_string(&frame) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(subject_id = %subject_id, "frame serialization failed: {}", e);
                break;
            }
        };

        if socket.send(WsMessage::Text(payload.into())).await.is_err() {
            break;
        }

        // Pull-paced: block until the client acknowledges with any frame.
        match socket.recv().await {
            Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
            Some(Ok(_)) => {}
        }
    }
}
