//! Error types for the entity store.

/// Errors that can occur during entity store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A unique-constrained field collided with an existing record.
    #[error("duplicate value for unique field: {0}")]
    Duplicate(&'static str),
}

/// Maps a constraint violation on `field` to [`StoreError::Duplicate`],
/// passing every other SQLite error through unchanged.
pub(crate) fn map_unique_violation(err: rusqlite::Error, field: &'static str) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Duplicate(field)
        }
        _ => StoreError::Database(err),
    }
}
