//! Session registry for the Tether platform.
//!
//! Tracks, per subject, whether a live writer connection is attached and
//! the most recent position sample. The registry is the authoritative
//! in-memory view while a writer is attached and the sole writer of the
//! durable `active` flag and position fields.
//!
//! The map lives behind a `tokio::sync::RwLock`; every critical section is
//! an O(1) map operation that never spans an `.await` on the database, so
//! reader connections may poll concurrently without contending on writer
//! traffic. Durable writes go through `tether-store` on the blocking pool.
//!
//! Sessions are not persisted across restarts — liveness and position are
//! recoverable from the durable record's last write.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_db::DbPool;
use tether_types::{GeoPosition, SubjectRecord};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Errors that can occur during session registry operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The subject's durable record does not resolve.
    #[error("no subject with id {0}")]
    SubjectNotFound(String),

    /// A writer connection already holds the slot for this subject.
    #[error("a writer is already attached for subject {0}")]
    WriterAlreadyAttached(String),

    /// Failed to check out a database connection.
    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A durable read or write failed.
    #[error(transparent)]
    Store(#[from] tether_store::StoreError),

    /// The blocking database task was cancelled or panicked.
    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// The live state held for a subject with an attached writer.
#[derive(Debug, Clone, Copy)]
struct LiveSession {
    writer_id: Uuid,
    sample: Option<PositionSample>,
}

/// The most recent position report with its receipt timestamp.
#[derive(Debug, Clone, Copy)]
struct PositionSample {
    position: GeoPosition,
    received_at: DateTime<Utc>,
}

/// Snapshot of a subject's liveness and position, as pushed to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub active: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub updated_at: String,
}

/// Per-subject writer slots and last known positions.
///
/// Cheap to clone; all clones share the same map.
#[derive(Clone)]
pub struct SessionRegistry {
    pool: DbPool,
    live: Arc<RwLock<HashMap<String, LiveSession>>>,
}

impl SessionRegistry {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            live: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers a writer connection for the subject and marks it active
    /// in durable storage. At most one writer per subject: a second attach
    /// while the slot is held fails with `WriterAlreadyAttached` (the
    /// second connection is the one rejected).
    ///
    /// Returns the writer id the connection must present to
    /// [`detach_writer`].
    pub async fn attach_writer(&self, subject_id: &str) -> Result<Uuid, SessionError> {
        // Resolve the durable record first so a bogus id never occupies
        // a slot.
        if self.load_subject(subject_id).await?.is_none() {
            return Err(SessionError::SubjectNotFound(subject_id.to_string()));
        }

        let writer_id = Uuid::new_v4();
        {
            let mut live = self.live.write().await;
            if live.contains_key(subject_id) {
                return Err(SessionError::WriterAlreadyAttached(subject_id.to_string()));
            }
            live.insert(
                subject_id.to_string(),
                LiveSession {
                    writer_id,
                    sample: None,
                },
            );
        }

        if let Err(e) = self.persist_active(subject_id, true).await {
            // Release the slot so a reconnect is not wrongly rejected.
            self.live.write().await.remove(subject_id);
            return Err(e);
        }

        tracing::info!(subject_id, %writer_id, "writer attached");
        Ok(writer_id)
    }

    /// Records a position report. Latest-received-wins: duplicates and
    /// out-of-order reports simply overwrite, in memory and durably.
    pub async fn report_position(
        &self,
        subject_id: &str,
        position: GeoPosition,
    ) -> Result<(), SessionError> {
        {
            let mut live = self.live.write().await;
            if let Some(session) = live.get_mut(subject_id) {
                session.sample = Some(PositionSample {
                    position,
                    received_at: Utc::now(),
                });
            }
        }

        let pool = self.pool.clone();
        let id = subject_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), SessionError> {
            let conn = pool.get()?;
            tether_store::update_position(&conn, &id, position)?;
            Ok(())
        })
        .await??;
        Ok(())
    }

    /// Releases the writer slot and marks the subject inactive durably.
    ///
    /// Only the connection holding the slot may release it: a detach with
    /// a stale writer id (from a rejected or superseded connection) is a
    /// no-op, so a disconnect racing a reconnect cannot clear the new
    /// writer's slot.
    pub async fn detach_writer(
        &self,
        subject_id: &str,
        writer_id: Uuid,
    ) -> Result<(), SessionError> {
        {
            let mut live = self.live.write().await;
            match live.get(subject_id) {
                Some(session) if session.writer_id == writer_id => {
                    live.remove(subject_id);
                }
                _ => return Ok(()),
            }
        }

        self.persist_active(subject_id, false).await?;
        tracing::info!(subject_id, %writer_id, "writer detached");
        Ok(())
    }

    /// Returns the subject's current liveness and position.
    ///
    /// `None` when the durable record no longer exists, even if a live
    /// session lingers — a deleted subject must read as gone. Otherwise
    /// the in-memory sample wins while a writer is attached, falling back
    /// to the durable position until the first report arrives.
    pub async fn current_view(&self, subject_id: &str) -> Result<Option<SessionView>, SessionError> {
        let Some(record) = self.load_subject(subject_id).await? else {
            return Ok(None);
        };

        let live = self.live.read().await;
        let view = match live.get(subject_id) {
            Some(session) => match session.sample {
                Some(sample) => SessionView {
                    active: true,
                    latitude: Some(sample.position.latitude),
                    longitude: Some(sample.position.longitude),
                    updated_at: sample.received_at.to_rfc3339(),
                },
                None => SessionView {
                    active: true,
                    latitude: record.position.map(|p| p.latitude),
                    longitude: record.position.map(|p| p.longitude),
                    updated_at: record.updated_at,
                },
            },
            None => SessionView {
                active: record.active,
                latitude: record.position.map(|p| p.latitude),
                longitude: record.position.map(|p| p.longitude),
                updated_at: record.updated_at,
            },
        };
        Ok(Some(view))
    }

    async fn load_subject(&self, subject_id: &str) -> Result<Option<SubjectRecord>, SessionError> {
        let pool = self.pool.clone();
        let id = subject_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<SubjectRecord>, SessionError> {
            let conn = pool.get()?;
            Ok(tether_store::get_subject(&conn, &id)?)
        })
        .await?
    }

    async fn persist_active(&self, subject_id: &str, active: bool) -> Result<(), SessionError> {
        let pool = self.pool.clone();
        let id = subject_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), SessionError> {
            let conn = pool.get()?;
            // A missing record here means the subject was deleted while
            // a connection lived; nothing to persist.
            tether_store::set_active(&conn, &id, active)?;
            Ok(())
        })
        .await?
    }
}
