use rusqlite::Connection;
use tether_types::{ObserverRecord, SubjectRecord};

use super::*;

fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    tether_db::run_migrations(&conn).expect("run migrations");
    conn
}

fn new_subject(conn: &Connection, name: &str) -> SubjectRecord {
    tether_store::create_subject(conn, name, None).unwrap()
}

fn new_observer(conn: &Connection, name: &str, contact: &str) -> ObserverRecord {
    tether_store::create_observer(conn, name, contact).unwrap()
}

fn edge_state(conn: &Connection, subject_id: &str, observer_id: &str) -> (bool, bool) {
    let subject = tether_store::get_subject(conn, subject_id).unwrap().unwrap();
    let observer = tether_store::get_observer(conn, observer_id).unwrap().unwrap();
    (
        subject.references_observer(observer_id),
        observer.references_subject(subject_id),
    )
}

#[test]
fn link_establishes_symmetric_edge() {
    let conn = test_conn();
    let s = new_subject(&conn, "Avery");
    let o = new_observer(&conn, "Kai", "+15550001111");

    let outcome = link(&conn, &s.id, &o.id).unwrap();
    assert_eq!(outcome, LinkOutcome::Linked);
    assert_eq!(edge_state(&conn, &s.id, &o.id), (true, true));
}

#[test]
fn link_is_idempotent() {
    let conn = test_conn();
    let s = new_subject(&conn, "Avery");
    let o = new_observer(&conn, "Kai", "+15550001111");

    link(&conn, &s.id, &o.id).unwrap();
    let second = link(&conn, &s.id, &o.id).unwrap();
    assert_eq!(second, LinkOutcome::AlreadyLinked);

    let subject = tether_store::get_subject(&conn, &s.id).unwrap().unwrap();
    assert_eq!(subject.observers, vec![o.id.clone()], "no duplicate entries");
}

#[test]
fn link_unknown_endpoint_fails() {
    let conn = test_conn();
    let s = new_subject(&conn, "Avery");

    match link(&conn, &s.id, "ghost") {
        Err(LedgerError::ObserverNotFound(id)) => assert_eq!(id, "ghost"),
        other => panic!("unexpected result: {other:?}"),
    }
    match link(&conn, "ghost", &s.id) {
        Err(LedgerError::SubjectNotFound(id)) => assert_eq!(id, "ghost"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn unlink_removes_both_sides() {
    let conn = test_conn();
    let s = new_subject(&conn, "Avery");
    let o = new_observer(&conn, "Kai", "+15550001111");
    link(&conn, &s.id, &o.id).unwrap();

    let outcome = unlink(&conn, &s.id, &o.id).unwrap();
    assert_eq!(outcome, UnlinkOutcome::Unlinked);
    assert_eq!(edge_state(&conn, &s.id, &o.id), (false, false));
}

#[test]
fn unlink_of_non_linked_pair_is_noop_success() {
    let conn = test_conn();
    let s = new_subject(&conn, "Avery");
    let o = new_observer(&conn, "Kai", "+15550001111");

    let outcome = unlink(&conn, &s.id, &o.id).unwrap();
    assert_eq!(outcome, UnlinkOutcome::NotLinked);
}

#[test]
fn half_link_is_completed_by_repair() {
    let conn = test_conn();
    let s = new_subject(&conn, "Avery");
    let o = new_observer(&conn, "Kai", "+15550001111");

    // Simulate a crash after the first (subject-side) write of link().
    tether_store::add_observer_ref(&conn, &s.id, &o.id).unwrap();
    assert_eq!(edge_state(&conn, &s.id, &o.id), (true, false));

    // Any ledger read of the pair converges it toward fully linked.
    let observers = list_observers(&conn, &s.id).unwrap();
    assert_eq!(observers.len(), 1);
    assert!(observers[0].references_subject(&s.id));
    assert_eq!(edge_state(&conn, &s.id, &o.id), (true, true));
}

#[test]
fn half_link_is_completed_by_relink() {
    let conn = test_conn();
    let s = new_subject(&conn, "Avery");
    let o = new_observer(&conn, "Kai", "+15550001111");

    tether_store::add_observer_ref(&conn, &s.id, &o.id).unwrap();

    let outcome = link(&conn, &s.id, &o.id).unwrap();
    assert_eq!(outcome, LinkOutcome::Linked, "observer side still changed");
    assert_eq!(edge_state(&conn, &s.id, &o.id), (true, true));
}

#[test]
fn half_unlink_is_rolled_forward_by_repair() {
    let conn = test_conn();
    let s = new_subject(&conn, "Avery");
    let o = new_observer(&conn, "Kai", "+15550001111");
    link(&conn, &s.id, &o.id).unwrap();

    // Simulate a crash after the first (subject-side) write of unlink().
    tether_store::remove_observer_ref(&conn, &s.id, &o.id).unwrap();
    assert_eq!(edge_state(&conn, &s.id, &o.id), (false, true));

    // Listing from the observer side converges toward fully unlinked and
    // excludes the half-gone subject from the result.
    let subjects = list_subjects(&conn, &o.id).unwrap();
    assert!(subjects.is_empty());
    assert_eq!(edge_state(&conn, &s.id, &o.id), (false, false));
}

#[test]
fn concurrent_style_double_repair_converges() {
    let conn = test_conn();
    let s = new_subject(&conn, "Avery");
    let o = new_observer(&conn, "Kai", "+15550001111");

    tether_store::add_observer_ref(&conn, &s.id, &o.id).unwrap();

    let subject = tether_store::get_subject(&conn, &s.id).unwrap().unwrap();
    let observer = tether_store::get_observer(&conn, &o.id).unwrap().unwrap();

    // Two callers holding the same stale snapshots repair back to back;
    // the second pass must not undo or duplicate the first.
    assert_eq!(
        repair_edge(&conn, &subject, &observer).unwrap(),
        RepairOutcome::CompletedLink
    );
    assert_eq!(
        repair_edge(&conn, &subject, &observer).unwrap(),
        RepairOutcome::CompletedLink
    );

    assert_eq!(edge_state(&conn, &s.id, &o.id), (true, true));
    let observer = tether_store::get_observer(&conn, &o.id).unwrap().unwrap();
    assert_eq!(observer.subjects, vec![s.id.clone()], "no duplicate entries");
}

#[test]
fn cascade_delete_subject_clears_every_observer() {
    let conn = test_conn();
    let s = new_subject(&conn, "Avery");
    let o1 = new_observer(&conn, "Kai", "+15550001111");
    let o2 = new_observer(&conn, "Sam", "+15550002222");
    link(&conn, &s.id, &o1.id).unwrap();
    link(&conn, &s.id, &o2.id).unwrap();

    cascade_delete_subject(&conn, &s.id).unwrap();

    assert!(tether_store::get_subject(&conn, &s.id).unwrap().is_none());
    for oid in [&o1.id, &o2.id] {
        let observer = tether_store::get_observer(&conn, oid).unwrap().unwrap();
        assert!(!observer.references_subject(&s.id));
    }

    // Safe to re-run after completion.
    cascade_delete_subject(&conn, &s.id).unwrap();
}

#[test]
fn cascade_delete_subject_with_no_observers() {
    let conn = test_conn();
    let s = new_subject(&conn, "Avery");
    cascade_delete_subject(&conn, &s.id).unwrap();
    assert!(tether_store::get_subject(&conn, &s.id).unwrap().is_none());
}

#[test]
fn cascade_delete_tolerates_missing_observer() {
    let conn = test_conn();
    let s = new_subject(&conn, "Avery");
    let o1 = new_observer(&conn, "Kai", "+15550001111");
    let o2 = new_observer(&conn, "Sam", "+15550002222");
    link(&conn, &s.id, &o1.id).unwrap();
    link(&conn, &s.id, &o2.id).unwrap();

    // o2 vanishes without a cascade (simulated corruption).
    tether_store::delete_observer(&conn, &o2.id).unwrap();

    cascade_delete_subject(&conn, &s.id).unwrap();
    assert!(tether_store::get_subject(&conn, &s.id).unwrap().is_none());
    let o1 = tether_store::get_observer(&conn, &o1.id).unwrap().unwrap();
    assert!(o1.subjects.is_empty());
}

#[test]
fn cascade_delete_observer_clears_every_subject() {
    let conn = test_conn();
    let s1 = new_subject(&conn, "Avery");
    let s2 = new_subject(&conn, "Blake");
    let o = new_observer(&conn, "Kai", "+15550001111");
    link(&conn, &s1.id, &o.id).unwrap();
    link(&conn, &s2.id, &o.id).unwrap();

    cascade_delete_observer(&conn, &o.id).unwrap();

    assert!(tether_store::get_observer(&conn, &o.id).unwrap().is_none());
    for sid in [&s1.id, &s2.id] {
        let subject = tether_store::get_subject(&conn, sid).unwrap().unwrap();
        assert!(!subject.references_observer(&o.id));
    }
}

#[test]
fn list_observers_drops_stale_references() {
    let conn = test_conn();
    let s = new_subject(&conn, "Avery");
    let o1 = new_observer(&conn, "Kai", "+15550001111");
    let o2 = new_observer(&conn, "Sam", "+15550002222");
    link(&conn, &s.id, &o1.id).unwrap();
    link(&conn, &s.id, &o2.id).unwrap();

    // o2's record deleted without cascade (simulated corruption).
    tether_store::delete_observer(&conn, &o2.id).unwrap();

    let observers = list_observers(&conn, &s.id).unwrap();
    assert_eq!(observers.len(), 1);
    assert_eq!(observers[0].id, o1.id);
}

#[test]
fn list_for_unknown_root_fails() {
    let conn = test_conn();
    assert!(matches!(
        list_observers(&conn, "ghost"),
        Err(LedgerError::SubjectNotFound(_))
    ));
    assert!(matches!(
        list_subjects(&conn, "ghost"),
        Err(LedgerError::ObserverNotFound(_))
    ));
}
