//! Shared record types for the Tether platform.
//!
//! This crate provides the entity records used across all Tether crates.
//! No crate in the workspace depends on anything *except* `tether-types`
//! for cross-cutting type definitions, which keeps the dependency graph
//! clean and prevents circular dependencies.
//!
//! The membership sets (`SubjectRecord::observers`,
//! `ObserverRecord::subjects`) are owned by the relationship ledger; the
//! `active` flag and position fields are owned by the session/broadcast
//! path. No other component mutates them.

use serde::{Deserialize, Serialize};

/// A geographic position sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

/// A tracked person whose live location is streamed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    /// Unique public ID (UUID v4).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Opaque invitation token observers use to establish a link.
    pub invite_token: String,
    /// Last known position; `None` until the first report.
    pub position: Option<GeoPosition>,
    /// Whether a writer connection is currently attached.
    pub active: bool,
    /// IDs of observers linked to this subject.
    ///
    /// Invariant (symmetric closure): every id here references an existing
    /// observer whose `subjects` set contains this subject's id, except
    /// during the window of a partially-applied link or unlink.
    pub observers: Vec<String>,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last update timestamp (ISO 8601).
    pub updated_at: String,
}

/// A party who monitors one or more subjects and receives alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverRecord {
    /// Unique public ID (UUID v4).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Contact address (unique across observers).
    pub contact: String,
    /// IDs of subjects this observer is linked to. Mirror of
    /// [`SubjectRecord::observers`].
    pub subjects: Vec<String>,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last update timestamp (ISO 8601).
    pub updated_at: String,
}

impl SubjectRecord {
    /// Returns true if this subject's set references the given observer.
    pub fn references_observer(&self, observer_id: &str) -> bool {
        self.observers.iter().any(|id| id == observer_id)
    }
}

impl ObserverRecord {
    /// Returns true if this observer's set references the given subject.
    pub fn references_subject(&self, subject_id: &str) -> bool {
        self.subjects.iter().any(|id| id == subject_id)
    }
}
