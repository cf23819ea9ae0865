//! End-to-end reservation scenarios through the public engine API.

use chrono::{Duration, Utc};
use slotkeeper_core::{CleanupJob, CoreError, ReservationEngine};
use slotkeeper_schema::{
    reservation, user, ActivityId, OccurrenceId, Reservation, ReservationState, Specification,
    User, UserId,
};
use slotkeeper_store::{
    verify_store_integrity, FileStore, MemoryStore, Persistence, Repository, UnitOfWork,
};
use std::sync::Arc;

struct Setup {
    engine: ReservationEngine,
    user: UserId,
    occurrence: OccurrenceId,
}

fn setup(backend: Arc<dyn Persistence>, maximum: u32, starts_in: Duration) -> Setup {
    let engine = ReservationEngine::new(backend);
    let user = engine.register_user("family@example.org", "Family").unwrap();
    let occ = engine
        .schedule_occurrence(
            ActivityId::new("pottery"),
            Utc::now() + starts_in,
            maximum,
            false,
        )
        .unwrap();
    Setup {
        engine,
        user: user.id,
        occurrence: occ.id,
    }
}

fn memory(maximum: u32) -> Setup {
    setup(Arc::new(MemoryStore::new()), maximum, Duration::days(5))
}

#[test]
fn create_confirm_complete_delete_leaves_no_trace() {
    let s = setup(Arc::new(MemoryStore::new()), 10, Duration::hours(-2));
    let r = s.engine.create(&s.user, &s.occurrence, 3, "two kids and a friend").unwrap();
    s.engine.confirm(&r.id).unwrap();
    s.engine.complete(&r.id).unwrap();
    s.engine.delete(&r.id).unwrap();

    let live = reservation::for_user(&s.user) & Specification::not_deleted();
    assert!(s.engine.reservations(&live).unwrap().is_empty());
    assert!(matches!(
        s.engine.reservation(&r.id),
        Err(CoreError::NotFound { .. })
    ));
}

#[test]
fn cancelling_confirmed_restores_exactly_its_amount() {
    let s = memory(10);
    let other = s
        .engine
        .schedule_occurrence(ActivityId::new("pottery"), Utc::now(), 10, false)
        .unwrap();
    s.engine.book(&s.user, &other.id, 4, "").unwrap();

    let a = s.engine.book(&s.user, &s.occurrence, 3, "").unwrap();
    s.engine.book(&s.user, &s.occurrence, 2, "").unwrap();
    assert_eq!(s.engine.availability(&s.occurrence).unwrap().used, 5);

    s.engine.cancel(&a.id).unwrap();
    assert_eq!(s.engine.availability(&s.occurrence).unwrap().used, 2);
    assert_eq!(s.engine.availability(&other.id).unwrap().used, 4);
}

#[test]
fn cancelling_pending_never_changes_capacity() {
    let s = memory(10);
    s.engine.book(&s.user, &s.occurrence, 6, "").unwrap();
    let pending = s.engine.create(&s.user, &s.occurrence, 3, "").unwrap();
    s.engine.cancel(&pending.id).unwrap();
    assert_eq!(s.engine.availability(&s.occurrence).unwrap().used, 6);
}

#[test]
fn delete_refused_for_active_states_without_mutation() {
    let s = memory(10);
    let pending = s.engine.create(&s.user, &s.occurrence, 1, "").unwrap();
    let confirmed = s.engine.book(&s.user, &s.occurrence, 1, "").unwrap();

    for r in [&pending, &confirmed] {
        assert!(matches!(
            s.engine.delete(&r.id),
            Err(CoreError::InvalidState { .. })
        ));
        assert_eq!(s.engine.reservation(&r.id).unwrap(), *r);
    }
    assert_eq!(s.engine.availability(&s.occurrence).unwrap().used, 1);
}

#[test]
fn confirm_into_full_occurrence_is_refused() {
    let s = memory(4);
    s.engine.book(&s.user, &s.occurrence, 4, "").unwrap();
    for amount in [1, 2, 4] {
        let r = s.engine.create(&s.user, &s.occurrence, amount, "").unwrap();
        assert!(matches!(
            s.engine.confirm(&r.id),
            Err(CoreError::CapacityExceeded { remaining: 0, .. })
        ));
        assert_eq!(
            s.engine.reservation(&r.id).unwrap().state,
            ReservationState::Pending
        );
    }
    assert_eq!(s.engine.availability(&s.occurrence).unwrap().used, 4);
}

#[test]
fn cleanup_soft_deletes_only_stale_unverified_accounts() {
    let backend: Arc<dyn Persistence> = Arc::new(MemoryStore::new());
    let users = Repository::<User>::new(Arc::clone(&backend));
    let now = Utc::now();

    let mut uow = UnitOfWork::new(Arc::clone(&backend), "seed");
    for i in 0..5 {
        let u = User::new(&format!("old{i}@example.org"), "Old", now - Duration::days(10));
        users.insert(&mut uow, &u).unwrap();
    }
    for i in 0..2 {
        let u = User::new(&format!("new{i}@example.org"), "New", now - Duration::days(1));
        users.insert(&mut uow, &u).unwrap();
    }
    uow.commit().unwrap();

    let report = CleanupJob::new(Arc::clone(&backend), Duration::days(7))
        .run(now)
        .unwrap();
    assert_eq!(report.count, 5);

    let live = users.query(&Specification::not_deleted()).unwrap();
    assert_eq!(live.len(), 2);
    assert!(live.iter().all(|v| v.entity.email.starts_with("new")));
    assert_eq!(users.count(&user::unverified()).unwrap(), 7);
}

#[test]
fn soft_deleted_user_cannot_book() {
    let backend: Arc<dyn Persistence> = Arc::new(MemoryStore::new());
    let s = setup(Arc::clone(&backend), 5, Duration::days(1));
    let users = Repository::<User>::new(Arc::clone(&backend));
    let current = users.get(s.user.as_str()).unwrap();
    let mut uow = UnitOfWork::new(backend, "delete-user");
    users.mark_deleted(&mut uow, &current, Utc::now()).unwrap();
    uow.commit().unwrap();

    assert!(matches!(
        s.engine.create(&s.user, &s.occurrence, 1, ""),
        Err(CoreError::NotFound { .. })
    ));
}

#[test]
fn file_store_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let (user, occ, kept) = {
        let s = setup(
            Arc::new(FileStore::open(dir.path()).unwrap()),
            6,
            Duration::days(2),
        );
        let kept = s.engine.book(&s.user, &s.occurrence, 4, "").unwrap();
        let dropped = s.engine.create(&s.user, &s.occurrence, 1, "").unwrap();
        s.engine.cancel(&dropped.id).unwrap();
        (s.user, s.occurrence, kept)
    };

    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let engine = ReservationEngine::new(store.clone());
    assert_eq!(engine.availability(&occ).unwrap().used, 4);
    assert_eq!(engine.reservation(&kept.id).unwrap(), kept);
    let mine: Vec<Reservation> = engine.reservations(&reservation::for_user(&user)).unwrap();
    assert_eq!(mine.len(), 2);
    assert!(verify_store_integrity(store.layout()).unwrap().is_clean());
}

#[test]
fn interrupted_confirm_on_file_store_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let s = setup(store.clone(), 6, Duration::days(2));
    let r = s.engine.create(&s.user, &s.occurrence, 2, "").unwrap();

    // The confirm batch writes the ledger entry and the reservation; fail the second.
    store.fail_after_writes(2);
    let err = s.engine.confirm(&r.id).unwrap_err();
    assert!(err.is_transient());

    assert_eq!(
        s.engine.reservation(&r.id).unwrap().state,
        ReservationState::Pending
    );
    assert_eq!(s.engine.availability(&s.occurrence).unwrap().used, 0);
    assert!(verify_store_integrity(store.layout()).unwrap().is_clean());

    s.engine.confirm(&r.id).unwrap();
    assert_eq!(s.engine.availability(&s.occurrence).unwrap().used, 2);
}
