use crate::concurrency::shutdown_requested;
use crate::config::EngineConfig;
use crate::ledger::{CapacityLedger, Usage};
use crate::lifecycle::{validate_delete, validate_transition};
use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use slotkeeper_schema::{
    normalize_email, occurrence, reservation, ActivityId, EmailClaim, Occurrence, OccurrenceId,
    Reservation, ReservationId, ReservationState, SoftDeletable, Specification, User, UserId,
};
use slotkeeper_store::{
    Collection, Entity, Expected, FileStore, Persistence, Repository, StoreError, UnitOfWork,
    Versioned,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Central API for the reservation lifecycle.
///
/// Every operation validates its input before touching the store, stages
/// its writes into one unit of work and commits them together, so a failed
/// call leaves every entity as it was. Capacity only changes inside
/// `confirm`, `book` and `cancel`, under the occurrence's ledger guard.
pub struct ReservationEngine {
    backend: Arc<dyn Persistence>,
    users: Repository<User>,
    claims: Repository<EmailClaim>,
    occurrences: Repository<Occurrence>,
    reservations: Repository<Reservation>,
    ledger: CapacityLedger,
}

/// Outcome of confirming a batch of pending reservations.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchReport {
    pub confirmed: Vec<ReservationId>,
    /// Left Pending because they did not fit.
    pub rejected: Vec<ReservationId>,
    /// Changed concurrently or failed for another reason.
    pub skipped: Vec<(ReservationId, String)>,
    pub interrupted: bool,
}

fn lookup<T: Entity>(repo: &Repository<T>, id: &str) -> Result<Versioned<T>, CoreError> {
    repo.find(id)?.ok_or_else(|| CoreError::NotFound {
        collection: T::COLLECTION,
        id: id.to_owned(),
    })
}

/// Like [`lookup`], but soft-deleted entities count as missing.
fn lookup_live<T: Entity + SoftDeletable>(
    repo: &Repository<T>,
    id: &str,
) -> Result<Versioned<T>, CoreError> {
    let found = lookup(repo, id)?;
    if found.entity.is_deleted() {
        return Err(CoreError::NotFound {
            collection: T::COLLECTION,
            id: id.to_owned(),
        });
    }
    Ok(found)
}

impl ReservationEngine {
    pub fn new(backend: Arc<dyn Persistence>) -> Self {
        Self {
            users: Repository::new(Arc::clone(&backend)),
            claims: Repository::new(Arc::clone(&backend)),
            occurrences: Repository::new(Arc::clone(&backend)),
            reservations: Repository::new(Arc::clone(&backend)),
            ledger: CapacityLedger::new(Arc::clone(&backend)),
            backend,
        }
    }

    /// Open the file store named by `config` and build an engine over it.
    pub fn open(config: &EngineConfig) -> Result<Self, CoreError> {
        let store = FileStore::open(&config.store_root)?;
        Ok(Self::new(Arc::new(store)))
    }

    pub fn backend(&self) -> &Arc<dyn Persistence> {
        &self.backend
    }

    fn unit(&self, label: &str) -> UnitOfWork {
        UnitOfWork::new(Arc::clone(&self.backend), label)
    }

    // Registration and scheduling

    /// Register an account under an address no live account holds.
    ///
    /// The address is claimed in the same commit as the account, with a
    /// revision precondition on the claim record, so of several concurrent
    /// registrations of one address exactly one succeeds. A claim held by a
    /// soft-deleted account is taken over.
    pub fn register_user(&self, email: &str, display_name: &str) -> Result<User, CoreError> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(CoreError::Validation(format!("invalid email address '{email}'")));
        }
        let already_registered =
            || CoreError::Validation(format!("email '{email}' is already registered"));

        let claim_key = EmailClaim::key_for(&email);
        let expected = match self.claims.find(&claim_key)? {
            None => Expected::Absent,
            Some(claim) => {
                let holder = self.users.find(claim.entity.user_id.as_str())?;
                if holder.is_some_and(|h| !h.entity.is_deleted()) {
                    return Err(already_registered());
                }
                claim.expected()
            }
        };

        let user = User::new(&email, display_name, Utc::now());
        let mut uow = self.unit("register-user");
        self.users.insert(&mut uow, &user)?;
        self.claims.save(&mut uow, &EmailClaim::new(&user), expected)?;
        match uow.commit() {
            Ok(_) => {}
            Err(StoreError::Conflict {
                collection: Collection::EmailClaims,
                ..
            }) => {
                debug!("lost registration race for {email}");
                return Err(already_registered());
            }
            Err(e) => return Err(e.into()),
        }
        info!("registered user {} <{}>", user.id, user.email);
        Ok(user)
    }

    pub fn confirm_email(&self, user_id: &UserId) -> Result<User, CoreError> {
        let current = lookup_live(&self.users, user_id.as_str())?;
        if current.entity.email_confirmed {
            return Ok(current.entity);
        }
        let mut user = current.entity;
        user.email_confirmed = true;
        let mut uow = self.unit("confirm-email");
        self.users.update(&mut uow, &user, current.revision)?;
        uow.commit()?;
        info!("confirmed email of user {}", user.id);
        Ok(user)
    }

    /// Schedule an occurrence. A `pending` one awaits approval and admits nothing.
    pub fn schedule_occurrence(
        &self,
        activity_id: ActivityId,
        starts_at: DateTime<Utc>,
        maximum_capacity: u32,
        pending: bool,
    ) -> Result<Occurrence, CoreError> {
        if maximum_capacity == 0 {
            return Err(CoreError::Validation(
                "maximum capacity must be at least 1".to_owned(),
            ));
        }
        let mut occurrence = Occurrence::new(activity_id, starts_at, maximum_capacity, Utc::now());
        occurrence.pending = pending;
        let mut uow = self.unit("schedule-occurrence");
        self.occurrences.insert(&mut uow, &occurrence)?;
        uow.commit()?;
        info!(
            "scheduled occurrence {} of {} at {starts_at} (capacity {maximum_capacity}{})",
            occurrence.id,
            occurrence.activity_id,
            if pending { ", pending" } else { "" }
        );
        Ok(occurrence)
    }

    pub fn approve_occurrence(&self, id: &OccurrenceId) -> Result<Occurrence, CoreError> {
        let current = lookup_live(&self.occurrences, id.as_str())?;
        if !current.entity.pending {
            return Ok(current.entity);
        }
        let mut occurrence = current.entity;
        occurrence.pending = false;
        let mut uow = self.unit("approve-occurrence");
        self.occurrences
            .update(&mut uow, &occurrence, current.revision)?;
        uow.commit()?;
        info!("approved occurrence {id}");
        Ok(occurrence)
    }

    // Lifecycle

    fn check_amount(amount: u32) -> Result<(), CoreError> {
        if amount < 1 {
            return Err(CoreError::Validation(
                "reservation amount must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// Record a Pending booking request. No capacity is reserved.
    pub fn create(
        &self,
        user_id: &UserId,
        occurrence_id: &OccurrenceId,
        amount: u32,
        comment: &str,
    ) -> Result<Reservation, CoreError> {
        Self::check_amount(amount)?;
        lookup_live(&self.users, user_id.as_str())?;
        lookup_live(&self.occurrences, occurrence_id.as_str())?;

        let reservation = Reservation::pending(
            user_id.clone(),
            occurrence_id.clone(),
            amount,
            comment,
            Utc::now(),
        );
        let mut uow = self.unit("create");
        self.reservations.insert(&mut uow, &reservation)?;
        uow.commit()?;
        info!(
            "created reservation {} for {amount} on {occurrence_id}",
            reservation.id
        );
        Ok(reservation)
    }

    /// Create and confirm in one commit. Nothing is written if it does not fit.
    pub fn book(
        &self,
        user_id: &UserId,
        occurrence_id: &OccurrenceId,
        amount: u32,
        comment: &str,
    ) -> Result<Reservation, CoreError> {
        Self::check_amount(amount)?;
        lookup_live(&self.users, user_id.as_str())?;

        let mut guard = self.ledger.guard(occurrence_id)?;
        let now = Utc::now();
        let mut reservation =
            Reservation::pending(user_id.clone(), occurrence_id.clone(), amount, comment, now);
        validate_transition(reservation.state, ReservationState::Confirmed)?;

        let mut uow = self.unit("book");
        if !guard.try_admit(&mut uow, amount)? {
            return Err(CoreError::CapacityExceeded {
                occurrence: occurrence_id.clone(),
                requested: amount,
                remaining: guard.usage().remaining(),
            });
        }
        reservation.state = ReservationState::Confirmed;
        self.reservations.insert(&mut uow, &reservation)?;
        uow.commit()?;
        info!(
            "booked reservation {} for {amount} on {occurrence_id} ({}/{} used)",
            reservation.id,
            guard.usage().used,
            guard.usage().maximum
        );
        Ok(reservation)
    }

    /// Admit a Pending reservation into its occurrence.
    ///
    /// On `CapacityExceeded` the reservation stays Pending and nothing is written.
    pub fn confirm(&self, id: &ReservationId) -> Result<Reservation, CoreError> {
        let occurrence_id = lookup(&self.reservations, id.as_str())?.entity.occurrence_id;
        let mut guard = self.ledger.guard(&occurrence_id)?;

        // Re-read under the key lock; the first read only located the occurrence.
        let current = lookup(&self.reservations, id.as_str())?;
        validate_transition(current.entity.state, ReservationState::Confirmed)?;
        let amount = current.entity.amount;

        let mut uow = self.unit("confirm");
        if !guard.try_admit(&mut uow, amount)? {
            let remaining = guard.usage().remaining();
            info!("confirm of {id} refused: requested {amount}, remaining {remaining}");
            return Err(CoreError::CapacityExceeded {
                occurrence: occurrence_id,
                requested: amount,
                remaining,
            });
        }
        let mut reservation = current.entity;
        reservation.state = ReservationState::Confirmed;
        reservation.updated_at = Utc::now();
        self.reservations
            .update(&mut uow, &reservation, current.revision)?;
        uow.commit()?;
        info!(
            "confirmed reservation {id} ({}/{} used on {occurrence_id})",
            guard.usage().used,
            guard.usage().maximum
        );
        Ok(reservation)
    }

    /// Decline a Pending or Confirmed reservation, releasing held capacity.
    pub fn cancel(&self, id: &ReservationId) -> Result<Reservation, CoreError> {
        let occurrence_id = lookup(&self.reservations, id.as_str())?.entity.occurrence_id;
        let mut guard = self.ledger.guard(&occurrence_id)?;

        let current = lookup(&self.reservations, id.as_str())?;
        validate_transition(current.entity.state, ReservationState::Cancelled)?;

        let mut uow = self.unit("cancel");
        if current.entity.state.holds_capacity() {
            guard.release(&mut uow, current.entity.amount)?;
        }
        let mut reservation = current.entity;
        reservation.state = ReservationState::Cancelled;
        reservation.updated_at = Utc::now();
        self.reservations
            .update(&mut uow, &reservation, current.revision)?;
        uow.commit()?;
        info!("cancelled reservation {id}");
        Ok(reservation)
    }

    /// Mark a Confirmed reservation Completed once its occurrence has started.
    pub fn complete(&self, id: &ReservationId) -> Result<Reservation, CoreError> {
        self.complete_as_of(id, Utc::now())
    }

    pub fn complete_as_of(
        &self,
        id: &ReservationId,
        now: DateTime<Utc>,
    ) -> Result<Reservation, CoreError> {
        let current = lookup(&self.reservations, id.as_str())?;
        validate_transition(current.entity.state, ReservationState::Completed)?;
        let occurrence = lookup(&self.occurrences, current.entity.occurrence_id.as_str())?;
        if occurrence.entity.starts_at >= now {
            return Err(CoreError::NotYetHeld {
                reservation: id.clone(),
                starts_at: occurrence.entity.starts_at,
            });
        }

        let mut reservation = current.entity;
        reservation.state = ReservationState::Completed;
        reservation.updated_at = now;
        let mut uow = self.unit("complete");
        self.reservations
            .update(&mut uow, &reservation, current.revision)?;
        uow.commit()?;
        info!("completed reservation {id}");
        Ok(reservation)
    }

    /// Physically remove a Completed or Cancelled reservation.
    pub fn delete(&self, id: &ReservationId) -> Result<(), CoreError> {
        let current = lookup(&self.reservations, id.as_str())?;
        validate_delete(id, current.entity.state)?;
        let mut uow = self.unit("delete");
        self.reservations
            .remove(&mut uow, id.as_str(), Expected::Revision(current.revision));
        uow.commit()?;
        info!("deleted reservation {id}");
        Ok(())
    }

    // Batches

    /// Confirm every Pending reservation of an occurrence, oldest first.
    ///
    /// Each reservation commits on its own, so one that does not fit stays
    /// Pending while later, smaller ones may still be admitted.
    pub fn confirm_pending(&self, occurrence_id: &OccurrenceId) -> Result<BatchReport, CoreError> {
        lookup(&self.occurrences, occurrence_id.as_str())?;
        let spec = (reservation::for_occurrence(occurrence_id)
            & reservation::in_state(ReservationState::Pending)
            & Specification::not_deleted())
        .named("pending reservations of occurrence");
        let mut queue: Vec<Reservation> = self
            .reservations
            .query(&spec)?
            .into_iter()
            .map(|v| v.entity)
            .collect();
        queue.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        debug!("confirming {} pending reservations on {occurrence_id}", queue.len());

        let mut report = BatchReport::default();
        for pending in queue {
            if shutdown_requested() {
                report.interrupted = true;
                break;
            }
            match self.confirm(&pending.id) {
                Ok(_) => report.confirmed.push(pending.id),
                Err(CoreError::CapacityExceeded { .. }) => report.rejected.push(pending.id),
                Err(e @ CoreError::InvalidTransition { .. }) => {
                    report.skipped.push((pending.id, e.to_string()));
                }
                Err(e) if e.is_transient() => {
                    warn!("confirm of {} failed, skipping: {e}", pending.id);
                    report.skipped.push((pending.id, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }
        info!(
            "batch confirm on {occurrence_id}: {} confirmed, {} rejected, {} skipped",
            report.confirmed.len(),
            report.rejected.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Complete every Confirmed reservation whose occurrence started before `now`.
    pub fn complete_elapsed(&self, now: DateTime<Utc>) -> Result<Vec<ReservationId>, CoreError> {
        let started: HashMap<OccurrenceId, DateTime<Utc>> = self
            .occurrences
            .query(&occurrence::starts_before(now))?
            .into_iter()
            .map(|v| (v.entity.id, v.entity.starts_at))
            .collect();
        let confirmed = self
            .reservations
            .query(&reservation::in_state(ReservationState::Confirmed))?;

        let mut uow = self.unit("complete-elapsed");
        let mut completed = Vec::new();
        for current in confirmed {
            if !started.contains_key(&current.entity.occurrence_id) {
                continue;
            }
            let mut r = current.entity;
            r.state = ReservationState::Completed;
            r.updated_at = now;
            self.reservations.update(&mut uow, &r, current.revision)?;
            completed.push(r.id);
        }
        uow.commit()?;
        if !completed.is_empty() {
            info!("completed {} elapsed reservations", completed.len());
        }
        Ok(completed)
    }

    // Reads

    pub fn availability(&self, occurrence_id: &OccurrenceId) -> Result<Usage, CoreError> {
        self.ledger.usage(occurrence_id)
    }

    pub fn ledger(&self) -> &CapacityLedger {
        &self.ledger
    }

    pub fn reservation(&self, id: &ReservationId) -> Result<Reservation, CoreError> {
        Ok(lookup(&self.reservations, id.as_str())?.entity)
    }

    pub fn occurrence(&self, id: &OccurrenceId) -> Result<Occurrence, CoreError> {
        Ok(lookup(&self.occurrences, id.as_str())?.entity)
    }

    pub fn user(&self, id: &UserId) -> Result<User, CoreError> {
        Ok(lookup(&self.users, id.as_str())?.entity)
    }

    pub fn reservations(
        &self,
        spec: &Specification<Reservation>,
    ) -> Result<Vec<Reservation>, CoreError> {
        Ok(self
            .reservations
            .query(spec)?
            .into_iter()
            .map(|v| v.entity)
            .collect())
    }

    pub fn occurrences(
        &self,
        spec: &Specification<Occurrence>,
    ) -> Result<Vec<Occurrence>, CoreError> {
        Ok(self
            .occurrences
            .query(spec)?
            .into_iter()
            .map(|v| v.entity)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use slotkeeper_store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        engine: ReservationEngine,
        user: UserId,
        occurrence: OccurrenceId,
    }

    fn fixture(maximum: u32) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let engine = ReservationEngine::new(store.clone());
        let user = engine.register_user("parent@example.org", "Parent").unwrap();
        let occ = engine
            .schedule_occurrence(
                ActivityId::new("climbing"),
                Utc::now() + Duration::days(2),
                maximum,
                false,
            )
            .unwrap();
        Fixture {
            store,
            engine,
            user: user.id,
            occurrence: occ.id,
        }
    }

    #[test]
    fn zero_amount_is_rejected_before_any_store_access() {
        let f = fixture(10);
        let commits = f.store.commit_count();
        let err = f
            .engine
            .create(&UserId::new("nobody"), &f.occurrence, 0, "")
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(f.store.commit_count(), commits);
    }

    #[test]
    fn create_requires_live_user_and_occurrence() {
        let f = fixture(10);
        assert!(matches!(
            f.engine.create(&UserId::new("ghost"), &f.occurrence, 1, ""),
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            f.engine.create(&f.user, &OccurrenceId::new("ghost"), 1, ""),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn create_reserves_no_capacity() {
        let f = fixture(3);
        let r = f.engine.create(&f.user, &f.occurrence, 3, " hi ").unwrap();
        assert_eq!(r.state, ReservationState::Pending);
        assert_eq!(r.comment, "hi");
        assert_eq!(f.engine.availability(&f.occurrence).unwrap().used, 0);
    }

    #[test]
    fn confirm_then_cancel_restores_capacity() {
        let f = fixture(5);
        let r = f.engine.create(&f.user, &f.occurrence, 2, "").unwrap();
        f.engine.confirm(&r.id).unwrap();
        assert_eq!(f.engine.availability(&f.occurrence).unwrap().used, 2);

        let cancelled = f.engine.cancel(&r.id).unwrap();
        assert_eq!(cancelled.state, ReservationState::Cancelled);
        assert_eq!(f.engine.availability(&f.occurrence).unwrap().used, 0);
    }

    #[test]
    fn cancel_pending_leaves_capacity_alone() {
        let f = fixture(5);
        let held = f.engine.book(&f.user, &f.occurrence, 1, "").unwrap();
        let r = f.engine.create(&f.user, &f.occurrence, 2, "").unwrap();
        f.engine.cancel(&r.id).unwrap();
        assert_eq!(f.engine.availability(&f.occurrence).unwrap().used, 1);
        assert_eq!(held.state, ReservationState::Confirmed);
    }

    #[test]
    fn cancel_twice_is_invalid() {
        let f = fixture(5);
        let r = f.engine.create(&f.user, &f.occurrence, 1, "").unwrap();
        f.engine.cancel(&r.id).unwrap();
        assert!(matches!(
            f.engine.cancel(&r.id),
            Err(CoreError::InvalidTransition {
                from: ReservationState::Cancelled,
                to: ReservationState::Cancelled
            })
        ));
    }

    #[test]
    fn confirm_over_capacity_leaves_pending() {
        let f = fixture(3);
        let r = f.engine.create(&f.user, &f.occurrence, 4, "").unwrap();
        let err = f.engine.confirm(&r.id).unwrap_err();
        assert!(matches!(
            err,
            CoreError::CapacityExceeded {
                requested: 4,
                remaining: 3,
                ..
            }
        ));
        assert_eq!(
            f.engine.reservation(&r.id).unwrap().state,
            ReservationState::Pending
        );
        assert_eq!(f.engine.availability(&f.occurrence).unwrap().used, 0);
    }

    #[test]
    fn failed_commit_leaves_everything_untouched() {
        let f = fixture(5);
        let r = f.engine.create(&f.user, &f.occurrence, 2, "").unwrap();
        f.store.fail_next_commits(1);
        let err = f.engine.confirm(&r.id).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(
            f.engine.reservation(&r.id).unwrap().state,
            ReservationState::Pending
        );
        assert_eq!(f.engine.availability(&f.occurrence).unwrap().used, 0);
        f.engine.confirm(&r.id).unwrap();
    }

    #[test]
    fn complete_requires_started_occurrence() {
        let f = fixture(5);
        let r = f.engine.book(&f.user, &f.occurrence, 1, "").unwrap();
        assert!(matches!(
            f.engine.complete(&r.id),
            Err(CoreError::NotYetHeld { .. })
        ));
        let later = Utc::now() + Duration::days(3);
        let done = f.engine.complete_as_of(&r.id, later).unwrap();
        assert_eq!(done.state, ReservationState::Completed);
        // Completion keeps the places counted.
        assert_eq!(f.engine.availability(&f.occurrence).unwrap().used, 1);
    }

    #[test]
    fn delete_only_retired() {
        let f = fixture(5);
        let r = f.engine.create(&f.user, &f.occurrence, 1, "").unwrap();
        assert!(matches!(
            f.engine.delete(&r.id),
            Err(CoreError::InvalidState { .. })
        ));
        f.engine.confirm(&r.id).unwrap();
        assert!(f.engine.delete(&r.id).is_err());
        f.engine.cancel(&r.id).unwrap();
        f.engine.delete(&r.id).unwrap();
        assert!(matches!(
            f.engine.reservation(&r.id),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn book_fails_without_trace() {
        let f = fixture(2);
        f.engine.book(&f.user, &f.occurrence, 2, "").unwrap();
        let before = f.store.commit_count();
        assert!(matches!(
            f.engine.book(&f.user, &f.occurrence, 1, ""),
            Err(CoreError::CapacityExceeded { remaining: 0, .. })
        ));
        assert_eq!(f.store.commit_count(), before);
        assert_eq!(
            f.engine
                .reservations(&reservation::for_occurrence(&f.occurrence))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn pending_occurrence_must_be_approved() {
        let f = fixture(5);
        let occ = f
            .engine
            .schedule_occurrence(ActivityId::new("art"), Utc::now(), 4, true)
            .unwrap();
        let r = f.engine.create(&f.user, &occ.id, 1, "").unwrap();
        assert!(matches!(
            f.engine.confirm(&r.id),
            Err(CoreError::OccurrenceNotApproved(_))
        ));
        f.engine.approve_occurrence(&occ.id).unwrap();
        f.engine.confirm(&r.id).unwrap();
    }

    #[test]
    fn confirm_pending_is_fifo() {
        let f = fixture(4);
        let first = f.engine.create(&f.user, &f.occurrence, 3, "").unwrap();
        let second = f.engine.create(&f.user, &f.occurrence, 2, "").unwrap();
        let third = f.engine.create(&f.user, &f.occurrence, 1, "").unwrap();

        let report = f.engine.confirm_pending(&f.occurrence).unwrap();
        assert_eq!(report.confirmed, vec![first.id, third.id]);
        assert_eq!(report.rejected, vec![second.id.clone()]);
        assert!(!report.interrupted);
        assert_eq!(
            f.engine.reservation(&second.id).unwrap().state,
            ReservationState::Pending
        );
        assert_eq!(f.engine.availability(&f.occurrence).unwrap().used, 4);
    }

    #[test]
    fn complete_elapsed_only_touches_started_occurrences() {
        let f = fixture(5);
        let past = f
            .engine
            .schedule_occurrence(ActivityId::new("art"), Utc::now() - Duration::hours(1), 5, false)
            .unwrap();
        let old = f.engine.book(&f.user, &past.id, 1, "").unwrap();
        let upcoming = f.engine.book(&f.user, &f.occurrence, 1, "").unwrap();
        let pending = f.engine.create(&f.user, &past.id, 1, "").unwrap();

        let done = f.engine.complete_elapsed(Utc::now()).unwrap();
        assert_eq!(done, vec![old.id.clone()]);
        assert_eq!(
            f.engine.reservation(&old.id).unwrap().state,
            ReservationState::Completed
        );
        assert_eq!(
            f.engine.reservation(&upcoming.id).unwrap().state,
            ReservationState::Confirmed
        );
        assert_eq!(
            f.engine.reservation(&pending.id).unwrap().state,
            ReservationState::Pending
        );
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let f = fixture(1);
        assert!(matches!(
            f.engine.register_user("PARENT@example.org", "Again"),
            Err(CoreError::Validation(_))
        ));
        let u = f.engine.confirm_email(&f.user).unwrap();
        assert!(u.email_confirmed);
    }

    #[test]
    fn address_of_deleted_account_can_be_registered_again() {
        let f = fixture(1);
        let users = Repository::<User>::new(f.store.clone());
        let current = users.get(f.user.as_str()).unwrap();
        let mut uow = UnitOfWork::new(f.store.clone(), "delete-user");
        assert!(users.mark_deleted(&mut uow, &current, Utc::now()).unwrap());
        uow.commit().unwrap();

        let again = f.engine.register_user("parent@example.org", "Again").unwrap();
        assert_ne!(again.id, f.user);
        let claim = Repository::<EmailClaim>::new(f.store.clone())
            .get(&EmailClaim::key_for("parent@example.org"))
            .unwrap();
        assert_eq!(claim.entity.user_id, again.id);
        assert_eq!(claim.revision, 2);
        assert!(matches!(
            f.engine.register_user("parent@example.org", "Third"),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn deleted_occurrence_cannot_be_booked() {
        let f = fixture(5);
        let occurrences = Repository::<Occurrence>::new(f.store.clone());
        let current = occurrences.get(f.occurrence.as_str()).unwrap();
        let mut uow = UnitOfWork::new(f.store.clone(), "delete-occurrence");
        assert!(occurrences.mark_deleted(&mut uow, &current, Utc::now()).unwrap());
        uow.commit().unwrap();

        for result in [
            f.engine.book(&f.user, &f.occurrence, 1, ""),
            f.engine.create(&f.user, &f.occurrence, 1, ""),
        ] {
            assert!(matches!(
                result,
                Err(CoreError::NotFound {
                    collection: Collection::Occurrences,
                    ..
                })
            ));
        }
    }
}
