//! Emergency alert handler.

use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tether_alerts::Notification;
use tether_ledger::LedgerError;
use tether_types::{GeoPosition, ObserverRecord, SubjectRecord};

/// `POST /api/subjects/{subjectId}/alert` — resolves the subject's
/// observer set and fans the emergency notification out to each, one
/// attempt per recipient. Individual delivery failures are counted in the
/// response, never surfaced as an error; an empty observer set reports
/// zero notified.
pub async fn raise_alert_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(subject_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let pool = state.pool.clone();
    let id = subject_id.clone();
    let resolved = tokio::task::spawn_blocking(
        move || -> Result<(SubjectRecord, Vec<ObserverRecord>), StatusCode> {
            let conn = pool.get().map_err(|e| {
                tracing::error!("database pool error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
            let subject = tether_store::get_subject(&conn, &id)
                .map_err(|e| {
                    tracing::error!("subject lookup failed: {}", e);
                    StatusCode::INTERNAL_SERVER_ERROR
                })?
                .ok_or(StatusCode::NOT_FOUND)?;
            let observers = tether_ledger::list_observers(&conn, &id).map_err(|e| match e {
                LedgerError::SubjectNotFound(_) => StatusCode::NOT_FOUND,
                other => {
                    tracing::error!("observer resolution failed: {}", other);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            })?;
            Ok((subject, observers))
        },
    )
    .await
    .map_err(|e| {
        tracing::error!("blocking task failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    let (subject, observers) = resolved;

    // Prefer the live sample over the durable record for the alert position.
    let position = match state.registry.current_view(&subject_id).await {
        Ok(Some(view)) => match (view.latitude, view.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPosition {
                latitude,
                longitude,
            }),
            _ => subject.position,
        },
        _ => subject.position,
    };

    let notification = Notification::emergency(&subject.id, &subject.name, position);
    let recipients: Vec<String> = observers.iter().map(|o| o.id.clone()).collect();
    let report = state.dispatcher.dispatch(&recipients, &notification).await;

    Ok(Json(json!({
        "success": true,
        "notified": report.attempted,
        "failed": report.failed,
    })))
}
