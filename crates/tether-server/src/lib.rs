//! Tether server library logic.

pub mod api_alerts;
pub mod api_links;
pub mod api_ws;
pub mod config;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Extension, Router,
};
use std::sync::Arc;
use tether_alerts::{AlertDispatcher, PushBackend};
use tether_db::DbPool;
use tether_session::SessionRegistry;
use tower_http::cors::{Any, CorsLayer};

/// Maximum request body size (64 KiB). The control-plane payloads are
/// tiny; anything larger is abuse.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Per-subject writer slots and live positions.
    pub registry: SessionRegistry,
    /// Alert fan-out through the configured push backend.
    pub dispatcher: Arc<AlertDispatcher<PushBackend>>,
}

impl AppState {
    /// Wires the state from a pool and push backend; the session registry
    /// shares the pool.
    pub fn new(pool: DbPool, backend: PushBackend) -> Self {
        Self {
            registry: SessionRegistry::new(pool.clone()),
            pool,
            dispatcher: Arc::new(AlertDispatcher::new(backend)),
        }
    }
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/links",
            post(api_links::create_link_handler).delete(api_links::remove_link_handler),
        )
        .route(
            "/api/subjects/{subjectId}/observers",
            get(api_links::list_observers_handler),
        )
        .route(
            "/api/observers/{observerId}/subjects",
            get(api_links::list_subjects_handler),
        )
        .route(
            "/api/subjects/{subjectId}",
            delete(api_links::delete_subject_handler),
        )
        .route(
            "/api/observers/{observerId}",
            delete(api_links::delete_observer_handler),
        )
        .route(
            "/api/subjects/{subjectId}/alert",
            post(api_alerts::raise_alert_handler),
        )
        .route("/ws/subject/{subjectId}", get(api_ws::writer_ws_handler))
        .route("/ws/track/{subjectId}", get(api_ws::reader_ws_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
