//! Persistence operations for subject records.

use rusqlite::{params, Connection, OptionalExtension, Row};
use tether_types::{GeoPosition, SubjectRecord};
use uuid::Uuid;

use crate::error::{map_unique_violation, StoreError};

const SUBJECT_COLUMNS: &str =
    "id, name, invite_token, latitude, longitude, active, observers_json, created_at, updated_at";

/// Intermediate row shape; the JSON set column is parsed outside the
/// rusqlite row-mapping closure so serde errors surface as `StoreError`.
struct RawSubject {
    id: String,
    name: String,
    invite_token: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    active: bool,
    observers_json: String,
    created_at: String,
    updated_at: String,
}

impl RawSubject {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            invite_token: row.get(2)?,
            latitude: row.get(3)?,
            longitude: row.get(4)?,
            active: row.get(5)?,
            observers_json: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<SubjectRecord, StoreError> {
        let observers: Vec<String> = serde_json::from_str(&self.observers_json)?;
        let position = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPosition {
                latitude,
                longitude,
            }),
            _ => None,
        };
        Ok(SubjectRecord {
            id: self.id,
            name: self.name,
            invite_token: self.invite_token,
            position,
            active: self.active,
            observers,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Creates a subject record with a fresh id and invitation token.
///
/// # Errors
///
/// Returns `StoreError::Duplicate` on the (astronomically unlikely)
/// invitation token collision, `StoreError::Database` on SQL failure.
pub fn create_subject(
    conn: &Connection,
    name: &str,
    position: Option<GeoPosition>,
) -> Result<SubjectRecord, StoreError> {
    let id = Uuid::new_v4().to_string();
    let invite_token = Uuid::new_v4().to_string();

    let (created_at, updated_at) = conn
        .query_row(
            "INSERT INTO subjects (id, name, invite_token, latitude, longitude)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING created_at, updated_at",
            params![
                id,
                name,
                invite_token,
                position.map(|p| p.latitude),
                position.map(|p| p.longitude),
            ],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .map_err(|e| map_unique_violation(e, "invite_token"))?;

    Ok(SubjectRecord {
        id,
        name: name.to_string(),
        invite_token,
        position,
        active: false,
        observers: Vec::new(),
        created_at,
        updated_at,
    })
}

/// Retrieves a subject by id. Returns `None` when the id does not resolve.
pub fn get_subject(conn: &Connection, id: &str) -> Result<Option<SubjectRecord>, StoreError> {
    let raw = conn
        .query_row(
            &format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE id = ?1"),
            params![id],
            RawSubject::from_row,
        )
        .optional()?;
    raw.map(RawSubject::into_record).transpose()
}

/// Resolves an invitation token to the subject that issued it.
pub fn find_subject_by_token(
    conn: &Connection,
    invite_token: &str,
) -> Result<Option<SubjectRecord>, StoreError> {
    let raw = conn
        .query_row(
            &format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE invite_token = ?1"),
            params![invite_token],
            RawSubject::from_row,
        )
        .optional()?;
    raw.map(RawSubject::into_record).transpose()
}

/// Deletes a subject record. Returns `false` when the record was already
/// gone, making repeated deletes a no-op.
pub fn delete_subject(conn: &Connection, id: &str) -> Result<bool, StoreError> {
    let changed = conn.execute("DELETE FROM subjects WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

/// Adds `observer_id` to the subject's membership set.
///
/// A single UPDATE statement: the duplicate check and the append happen
/// atomically, so concurrent callers cannot produce a duplicate entry and
/// re-adding an existing member is a no-op. Returns `true` when the set
/// actually changed.
pub fn add_observer_ref(
    conn: &Connection,
    subject_id: &str,
    observer_id: &str,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE subjects
         SET observers_json = json_insert(observers_json, '$[#]', ?2),
             updated_at = datetime('now')
         WHERE id = ?1
           AND NOT EXISTS (SELECT 1 FROM json_each(observers_json) WHERE value = ?2)",
        params![subject_id, observer_id],
    )?;
    Ok(changed > 0)
}

/// Removes `observer_id` from the subject's membership set.
///
/// Atomic and idempotent for the same reason as [`add_observer_ref`].
/// Returns `true` when the member was present and removed.
pub fn remove_observer_ref(
    conn: &Connection,
    subject_id: &str,
    observer_id: &str,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE subjects
         SET observers_json = (SELECT json_group_array(value)
                               FROM json_each(observers_json)
                               WHERE value <> ?2),
             updated_at = datetime('now')
         WHERE id = ?1
           AND EXISTS (SELECT 1 FROM json_each(observers_json) WHERE value = ?2)",
        params![subject_id, observer_id],
    )?;
    Ok(changed > 0)
}

/// Overwrites the subject's last known position (latest-received-wins).
/// Returns `false` when the subject record no longer exists.
pub fn update_position(
    conn: &Connection,
    subject_id: &str,
    position: GeoPosition,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE subjects
         SET latitude = ?2, longitude = ?3, updated_at = datetime('now')
         WHERE id = ?1",
        params![subject_id, position.latitude, position.longitude],
    )?;
    Ok(changed > 0)
}

/// Sets the subject's liveness flag. Returns `false` when the subject
/// record no longer exists.
pub fn set_active(conn: &Connection, subject_id: &str, active: bool) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE subjects SET active = ?2, updated_at = datetime('now') WHERE id = ?1",
        params![subject_id, active],
    )?;
    Ok(changed > 0)
}
