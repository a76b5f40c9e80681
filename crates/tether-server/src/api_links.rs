//! Relationship control-plane handlers: linking, listing, cascade deletes.

use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tether_ledger::{LedgerError, LinkOutcome, UnlinkOutcome};

/// Body for `POST /api/links`: an observer presents a subject's
/// invitation token to establish the edge.
#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    pub observer_id: String,
    pub invitation_token: String,
}

/// Body for `DELETE /api/links`.
#[derive(Debug, Deserialize)]
pub struct RemoveLinkRequest {
    pub subject_id: String,
    pub observer_id: String,
}

/// Observer projection returned to subjects, matching the mobile client's
/// contact-list shape.
#[derive(Debug, Serialize)]
pub struct ObserverSummary {
    pub id: String,
    pub name: String,
    pub contact: String,
}

/// Subject projection returned to observers: enough to render a tracking
/// list without another round trip.
#[derive(Debug, Serialize)]
pub struct SubjectSummary {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::SubjectNotFound(_) | LedgerError::ObserverNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        LedgerError::Store(e) => {
            tracing::error!("ledger store failure: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn pool_conn(
    pool: &tether_db::DbPool,
) -> Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>, StatusCode> {
    pool.get().map_err(|e| {
        tracing::error!("database pool error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn run_blocking<T, F>(task: F) -> Result<T, StatusCode>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StatusCode> + Send + 'static,
{
    tokio::task::spawn_blocking(task).await.map_err(|e| {
        tracing::error!("blocking task failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
}

/// `POST /api/links` — resolves the invitation token and links the
/// observer to the issuing subject. Unknown tokens are 404; re-linking an
/// existing pair is a success.
pub async fn create_link_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<CreateLinkRequest>,
) -> Result<Json<Value>, StatusCode> {
    let pool = state.pool.clone();
    run_blocking(move || {
        let conn = pool_conn(&pool)?;

        let subject = tether_store::find_subject_by_token(&conn, &req.invitation_token)
            .map_err(|e| {
                tracing::error!("invitation lookup failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .ok_or(StatusCode::NOT_FOUND)?;

        match tether_ledger::link(&conn, &subject.id, &req.observer_id) {
            Ok(outcome) => Ok(Json(json!({
                "success": true,
                "subject_id": subject.id,
                "already_linked": outcome == LinkOutcome::AlreadyLinked,
            }))),
            Err(e) => Err(ledger_status(&e)),
        }
    })
    .await
}

/// `DELETE /api/links` — removes the edge. Unlinking a pair that is not
/// linked is a success, per the ledger's idempotence contract.
pub async fn remove_link_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<RemoveLinkRequest>,
) -> Result<Json<Value>, StatusCode> {
    let pool = state.pool.clone();
    run_blocking(move || {
        let conn = pool_conn(&pool)?;
        match tether_ledger::unlink(&conn, &req.subject_id, &req.observer_id) {
            Ok(outcome) => Ok(Json(json!({
                "success": true,
                "was_linked": outcome == UnlinkOutcome::Unlinked,
            }))),
            Err(e) => Err(ledger_status(&e)),
        }
    })
    .await
}

/// `GET /api/subjects/{subjectId}/observers`
pub async fn list_observers_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(subject_id): Path<String>,
) -> Result<Json<Vec<ObserverSummary>>, StatusCode> {
    let pool = state.pool.clone();
    run_blocking(move || {
        let conn = pool_conn(&pool)?;
        let observers =
            tether_ledger::list_observers(&conn, &subject_id).map_err(|e| ledger_status(&e))?;
        Ok(Json(
            observers
                .into_iter()
                .map(|o| ObserverSummary {
                    id: o.id,
                    name: o.name,
                    contact: o.contact,
                })
                .collect(),
        ))
    })
    .await
}

/// `GET /api/observers/{observerId}/subjects`
pub async fn list_subjects_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(observer_id): Path<String>,
) -> Result<Json<Vec<SubjectSummary>>, StatusCode> {
    let pool = state.pool.clone();
    run_blocking(move || {
        let conn = pool_conn(&pool)?;
        let subjects =
            tether_ledger::list_subjects(&conn, &observer_id).map_err(|e| ledger_status(&e))?;
        Ok(Json(
            subjects
                .into_iter()
                .map(|s| SubjectSummary {
                    id: s.id,
                    name: s.name,
                    active: s.active,
                    latitude: s.position.map(|p| p.latitude),
                    longitude: s.position.map(|p| p.longitude),
                })
                .collect(),
        ))
    })
    .await
}

/// `DELETE /api/subjects/{subjectId}` — cascade delete; no observer keeps
/// a reference afterwards. Deleting an already-deleted subject succeeds.
pub async fn delete_subject_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(subject_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let pool = state.pool.clone();
    run_blocking(move || {
        let conn = pool_conn(&pool)?;
        tether_ledger::cascade_delete_subject(&conn, &subject_id)
            .map_err(|e| ledger_status(&e))?;
        Ok(Json(json!({ "success": true })))
    })
    .await
}

/// `DELETE /api/observers/{observerId}` — symmetric cascade delete.
pub async fn delete_observer_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(observer_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let pool = state.pool.clone();
    run_blocking(move || {
        let conn = pool_conn(&pool)?;
        tether_ledger::cascade_delete_observer(&conn, &observer_id)
            .map_err(|e| ledger_status(&e))?;
        Ok(Json(json!({ "success": true })))
    })
    .await
}
