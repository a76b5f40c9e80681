//! Entity store for the Tether platform.
//!
//! Key/value-style persistence for subject and observer records over the
//! `tether-db` SQLite layer: get/create/delete by id, plus atomic
//! single-record set-add / set-remove on the membership set columns.
//!
//! Every set mutation is a single UPDATE statement using SQLite's JSON
//! functions, so the membership check and the write cannot be split by a
//! concurrent caller. The store offers **no cross-record atomicity** — a
//! link touches two records through two independent statements. The
//! relationship ledger (`tether-ledger`) owns that consistency story via
//! its fixed write order and repair pass; this crate deliberately knows
//! nothing about it.
//!
//! The control-plane operations the core consumes from registration flows
//! live here as well: [`create_subject`] (which mints the invitation
//! token), [`create_observer`], and [`find_subject_by_token`].

mod error;
mod observer;
mod subject;

pub use error::StoreError;
pub use observer::{
    add_subject_ref, create_observer, delete_observer, get_observer, remove_subject_ref,
};
pub use subject::{
    add_observer_ref, create_subject, delete_subject, find_subject_by_token, get_subject,
    remove_observer_ref, set_active, update_position,
};
