//! Database layer for the Tether platform.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode
//! initialization, and embedded SQL migrations. Both entity collections
//! (subjects and observers) are created through versioned migrations
//! managed by this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: a single-process store is all the entity
//!   collections need. WAL mode allows concurrent readers with a single
//!   writer, which matches the access pattern of many reader connections
//!   against one writer per subject.
//! - **Membership sets as JSON columns**: the relationship between a
//!   subject and its observers lives in a JSON array column on each
//!   record. There is deliberately no junction table and no foreign-key
//!   cascade — the ledger's fixed write order and repair pass own the
//!   cross-record consistency story.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`, so the schema ships with the server and cannot drift
//!   from the code that depends on it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
