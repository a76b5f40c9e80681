//! Persistence operations for observer records.

use rusqlite::{params, Connection, OptionalExtension, Row};
use tether_types::ObserverRecord;
use uuid::Uuid;

use crate::error::{map_unique_violation, StoreError};

const OBSERVER_COLUMNS: &str = "id, name, contact, subjects_json, created_at, updated_at";

struct RawObserver {
    id: String,
    name: String,
    contact: String,
    subjects_json: String,
    created_at: String,
    updated_at: String,
}

impl RawObserver {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            contact: row.get(2)?,
            subjects_json: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<ObserverRecord, StoreError> {
        let subjects: Vec<String> = serde_json::from_str(&self.subjects_json)?;
        Ok(ObserverRecord {
            id: self.id,
            name: self.name,
            contact: self.contact,
            subjects,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Creates an observer record with a fresh id.
///
/// # Errors
///
/// Returns `StoreError::Duplicate("contact")` when the contact address is
/// already registered, `StoreError::Database` on other SQL failures.
pub fn create_observer(
    conn: &Connection,
    name: &str,
    contact: &str,
) -> Result<ObserverRecord, StoreError> {
    let id = Uuid::new_v4().to_string();

    let (created_at, updated_at) = conn
        .query_row(
            "INSERT INTO observers (id, name, contact) VALUES (?1, ?2, ?3)
             RETURNING created_at, updated_at",
            params![id, name, contact],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .map_err(|e| map_unique_violation(e, "contact"))?;

    Ok(ObserverRecord {
        id,
        name: name.to_string(),
        contact: contact.to_string(),
        subjects: Vec::new(),
        created_at,
        updated_at,
    })
}

/// Retrieves an observer by id. Returns `None` when the id does not resolve.
pub fn get_observer(conn: &Connection, id: &str) -> Result<Option<ObserverRecord>, StoreError> {
    let raw = conn
        .query_row(
            &format!("SELECT {OBSERVER_COLUMNS} FROM observers WHERE id = ?1"),
            params![id],
            RawObserver::from_row,
        )
        .optional()?;
    raw.map(RawObserver::into_record).transpose()
}

/// Deletes an observer record. Returns `false` when already gone.
pub fn delete_observer(conn: &Connection, id: &str) -> Result<bool, StoreError> {
    let changed = conn.execute("DELETE FROM observers WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

/// Adds `subject_id` to the observer's membership set. Atomic single
/// statement, idempotent; returns `true` when the set actually changed.
pub fn add_subject_ref(
    conn: &Connection,
    observer_id: &str,
    subject_id: &str,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE observers
         SET subjects_json = json_insert(subjects_json, '$[#]', ?2),
             updated_at = datetime('now')
         WHERE id = ?1
           AND NOT EXISTS (SELECT 1 FROM json_each(subjects_json) WHERE value = ?2)",
        params![observer_id, subject_id],
    )?;
    Ok(changed > 0)
}

/// Removes `subject_id` from the observer's membership set. Atomic single
/// statement, idempotent; returns `true` when the member was removed.
pub fn remove_subject_ref(
    conn: &Connection,
    observer_id: &str,
    subject_id: &str,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE observers
         SET subjects_json = (SELECT json_group_array(value)
                              FROM json_each(subjects_json)
                              WHERE value <> ?2),
             updated_at = datetime('now')
         WHERE id = ?1
           AND EXISTS (SELECT 1 FROM json_each(subjects_json) WHERE value = ?2)",
        params![observer_id, subject_id],
    )?;
    Ok(changed > 0)
}
