//! Relationship ledger for the Tether platform.
//!
//! Maintains the symmetric membership invariant between
//! `SubjectRecord::observers` and `ObserverRecord::subjects`. An edge is
//! the pair of mirrored references; both halves must be written for the
//! edge to exist, and the store offers no cross-record transaction.
//!
//! Instead of emulating one, every dual write uses a **fixed order** —
//! subject record first, then observer record — so a crash between the two
//! writes always leaves one of two recognizable shapes:
//!
//! - subject references observer, observer does not: a crashed **link**
//! - observer references subject, subject does not: a crashed **unlink**
//!
//! The subject side is therefore authoritative, and [`repair_edge`] is one
//! code path: mirror the observer side to match the subject side. Repairs
//! run opportunistically whenever a ledger operation has both records in
//! hand. The underlying set operations are idempotent single statements,
//! so concurrent repairs of the same pair interleave without producing a
//! worse state than either repair alone.
//!
//! This crate is the sole writer of the membership set fields.

use rusqlite::Connection;
use tether_types::{ObserverRecord, SubjectRecord};
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("subject not found: {0}")]
    SubjectNotFound(String),
    #[error("observer not found: {0}")]
    ObserverNotFound(String),
    #[error(transparent)]
    Store(#[from] tether_store::StoreError),
}

/// Result of a [`link`] call. Both variants are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The edge was established (or completed from a half-link).
    Linked,
    /// Both halves were already present.
    AlreadyLinked,
}

/// Result of an [`unlink`] call. Both variants are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlinkOutcome {
    /// At least one half was present and removed.
    Unlinked,
    /// Neither record referenced the other.
    NotLinked,
}

/// Result of a [`repair_edge`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Both sides already agreed.
    Consistent,
    /// A half-link was completed toward "fully linked".
    CompletedLink,
    /// A half-unlink was rolled forward to "fully unlinked".
    RolledBackUnlink,
}

/// Reconciles one edge between records already in hand.
///
/// The subject side is authoritative because every dual write touches the
/// subject record first (see the crate docs for the two half-applied
/// shapes this produces).
pub fn repair_edge(
    conn: &Connection,
    subject: &SubjectRecord,
    observer: &ObserverRecord,
) -> Result<RepairOutcome, LedgerError> {
    let subject_side = subject.references_observer(&observer.id);
    let observer_side = observer.references_subject(&subject.id);

    match (subject_side, observer_side) {
        (true, false) => {
            tether_store::add_subject_ref(conn, &observer.id, &subject.id)?;
            tracing::info!(
                subject_id = %subject.id,
                observer_id = %observer.id,
                "completed half-link: added missing observer-side reference"
            );
            Ok(RepairOutcome::CompletedLink)
        }
        (false, true) => {
            tether_store::remove_subject_ref(conn, &observer.id, &subject.id)?;
            tracing::info!(
                subject_id = %subject.id,
                observer_id = %observer.id,
                "rolled crashed unlink forward: cleared observer-side reference"
            );
            Ok(RepairOutcome::RolledBackUnlink)
        }
        _ => Ok(RepairOutcome::Consistent),
    }
}

/// Establishes the edge between a subject and an observer.
///
/// Idempotent: re-linking an already-linked pair returns
/// [`LinkOutcome::AlreadyLinked`] rather than an error. The subject-side
/// write always happens first; because both set-adds are idempotent, a
/// half-linked pair is simply completed.
///
/// # Errors
///
/// Returns `SubjectNotFound` / `ObserverNotFound` when either id does not
/// resolve.
pub fn link(
    conn: &Connection,
    subject_id: &str,
    observer_id: &str,
) -> Result<LinkOutcome, LedgerError> {
    ensure_pair_exists(conn, subject_id, observer_id)?;

    // Subject record first, then observer record. Fixed order keeps a
    // crash between the two writes to a single recognizable shape.
    let subject_changed = tether_store::add_observer_ref(conn, subject_id, observer_id)?;
    let observer_changed = tether_store::add_subject_ref(conn, observer_id, subject_id)?;

    if subject_changed || observer_changed {
        tracing::info!(subject_id, observer_id, "linked subject and observer");
        Ok(LinkOutcome::Linked)
    } else {
        Ok(LinkOutcome::AlreadyLinked)
    }
}

/// Destroys the edge between a subject and an observer.
///
/// Idempotent: unlinking a non-linked pair returns
/// [`UnlinkOutcome::NotLinked`] rather than an error. Subject side is
/// removed first, mirroring the link order.
pub fn unlink(
    conn: &Connection,
    subject_id: &str,
    observer_id: &str,
) -> Result<UnlinkOutcome, LedgerError> {
    ensure_pair_exists(conn, subject_id, observer_id)?;

    let subject_changed = tether_store::remove_observer_ref(conn, subject_id, observer_id)?;
    let observer_changed = tether_store::remove_subject_ref(conn, observer_id, subject_id)?;

    if subject_changed || observer_changed {
        tracing::info!(subject_id, observer_id, "unlinked subject and observer");
        Ok(UnlinkOutcome::Unlinked)
    } else {
        Ok(UnlinkOutcome::NotLinked)
    }
}

/// Deletes a subject and removes its id from every linked observer.
///
/// Two-phase: mutate each referencing observer first, delete the root
/// record last, so an interrupted cascade can simply be re-run. Observers
/// that no longer resolve are skipped silently. Re-running after the
/// subject record is gone is a no-op.
pub fn cascade_delete_subject(conn: &Connection, subject_id: &str) -> Result<(), LedgerError> {
    let Some(subject) = tether_store::get_subject(conn, subject_id)? else {
        return Ok(());
    };

    for observer_id in &subject.observers {
        let removed = tether_store::remove_subject_ref(conn, observer_id, subject_id)?;
        if !removed {
            tracing::debug!(
                subject_id,
                observer_id = %observer_id,
                "cascade: observer missing or already detached"
            );
        }
    }

    tether_store::delete_subject(conn, subject_id)?;
    tracing::info!(
        subject_id,
        observer_count = subject.observers.len(),
        "cascade-deleted subject"
    );
    Ok(())
}

/// Deletes an observer and removes its id from every linked subject.
/// Symmetric to [`cascade_delete_subject`].
pub fn cascade_delete_observer(conn: &Connection, observer_id: &str) -> Result<(), LedgerError> {
    let Some(observer) = tether_store::get_observer(conn, observer_id)? else {
        return Ok(());
    };

    for subject_id in &observer.subjects {
        let removed = tether_store::remove_observer_ref(conn, subject_id, observer_id)?;
        if !removed {
            tracing::debug!(
                observer_id,
                subject_id = %subject_id,
                "cascade: subject missing or already detached"
            );
        }
    }

    tether_store::delete_observer(conn, observer_id)?;
    tracing::info!(
        observer_id,
        subject_count = observer.subjects.len(),
        "cascade-deleted observer"
    );
    Ok(())
}

/// Resolves a subject's observer set to full records.
///
/// Ids that no longer resolve are dropped silently (logged, never
/// surfaced); a dangling edge must not fail the caller. Each resolved
/// pair gets an opportunistic [`repair_edge`] pass — here that can only
/// complete a half-link, since every listed pair has the subject side
/// present by construction.
pub fn list_observers(
    conn: &Connection,
    subject_id: &str,
) -> Result<Vec<ObserverRecord>, LedgerError> {
    let subject = tether_store::get_subject(conn, subject_id)?
        .ok_or_else(|| LedgerError::SubjectNotFound(subject_id.to_string()))?;

    let mut observers = Vec::with_capacity(subject.observers.len());
    for observer_id in &subject.observers {
        match tether_store::get_observer(conn, observer_id)? {
            Some(mut observer) => {
                if repair_edge(conn, &subject, &observer)? == RepairOutcome::CompletedLink {
                    observer.subjects.push(subject.id.clone());
                }
                observers.push(observer);
            }
            None => {
                tracing::warn!(
                    subject_id,
                    observer_id = %observer_id,
                    "dropping stale observer reference"
                );
            }
        }
    }
    Ok(observers)
}

/// Resolves an observer's subject set to full records.
///
/// Stale ids are dropped as in [`list_observers`]. A pair whose subject
/// side is missing is a crashed unlink; the repair pass rolls it forward
/// and the subject is excluded from the result.
pub fn list_subjects(
    conn: &Connection,
    observer_id: &str,
) -> Result<Vec<SubjectRecord>, LedgerError> {
    let observer = tether_store::get_observer(conn, observer_id)?
        .ok_or_else(|| LedgerError::ObserverNotFound(observer_id.to_string()))?;

    let mut subjects = Vec::with_capacity(observer.subjects.len());
    for subject_id in &observer.subjects {
        match tether_store::get_subject(conn, subject_id)? {
            Some(subject) => {
                if repair_edge(conn, &subject, &observer)? == RepairOutcome::RolledBackUnlink {
                    continue;
                }
                subjects.push(subject);
            }
            None => {
                tracing::warn!(
                    observer_id,
                    subject_id = %subject_id,
                    "dropping stale subject reference"
                );
            }
        }
    }
    Ok(subjects)
}

fn ensure_pair_exists(
    conn: &Connection,
    subject_id: &str,
    observer_id: &str,
) -> Result<(), LedgerError> {
    if tether_store::get_subject(conn, subject_id)?.is_none() {
        return Err(LedgerError::SubjectNotFound(subject_id.to_string()));
    }
    if tether_store::get_observer(conn, observer_id)?.is_none() {
        return Err(LedgerError::ObserverNotFound(observer_id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
