//! Reservation admission and lifecycle engine for Slotkeeper.
//!
//! This crate ties the schema and store layers together into the
//! `ReservationEngine`: the central API for creating, confirming, cancelling,
//! completing and deleting reservations. Capacity is only ever changed through
//! the `CapacityLedger`, which serializes admission per occurrence with
//! in-process key locks and a revision check at the storage layer. It also
//! provides the unverified-account `CleanupJob` and the TOML `EngineConfig`.

pub mod cleanup;
pub mod concurrency;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod lifecycle;

pub use cleanup::{CleanupJob, CleanupReport};
pub use concurrency::{install_signal_handler, shutdown_requested, KeyGuard, KeyedLocks};
pub use config::{CleanupConfig, EngineConfig};
pub use engine::{BatchReport, ReservationEngine};
pub use ledger::{CapacityLedger, LedgerGuard, Usage};
pub use lifecycle::{validate_delete, validate_transition};

use chrono::{DateTime, Utc};
use slotkeeper_schema::{OccurrenceId, ReservationId, ReservationState};
use slotkeeper_store::{Collection, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(
        "capacity exceeded on occurrence {occurrence}: requested {requested}, remaining {remaining}"
    )]
    CapacityExceeded {
        occurrence: OccurrenceId,
        requested: u32,
        remaining: u32,
    },
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: ReservationState,
        to: ReservationState,
    },
    #[error("invalid state: reservation {reservation} is {state}; only completed or cancelled reservations can be deleted")]
    InvalidState {
        reservation: ReservationId,
        state: ReservationState,
    },
    #[error("not found: {collection}/{id}")]
    NotFound { collection: Collection, id: String },
    #[error("occurrence {0} is awaiting approval")]
    OccurrenceNotApproved(OccurrenceId),
    #[error("reservation {reservation} cannot complete before its occurrence starts at {starts_at}")]
    NotYetHeld {
        reservation: ReservationId,
        starts_at: DateTime<Utc>,
    },
    #[error("config error: {0}")]
    Config(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Whether retrying the same call may succeed.
    ///
    /// True for revision conflicts with a concurrent writer and for
    /// I/O-level store failures. Domain refusals are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Store(
                StoreError::Conflict { .. }
                    | StoreError::Io(_)
                    | StoreError::LockFailed(_)
                    | StoreError::Injected(_)
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_exceeded_message() {
        let e = CoreError::CapacityExceeded {
            occurrence: OccurrenceId::new("occ1"),
            requested: 2,
            remaining: 1,
        };
        assert_eq!(
            e.to_string(),
            "capacity exceeded on occurrence occ1: requested 2, remaining 1"
        );
    }

    #[test]
    fn invalid_transition_message() {
        let e = CoreError::InvalidTransition {
            from: ReservationState::Cancelled,
            to: ReservationState::Confirmed,
        };
        assert_eq!(e.to_string(), "invalid state transition: cancelled -> confirmed");
    }

    #[test]
    fn only_store_failures_are_transient() {
        let conflict = CoreError::Store(StoreError::Conflict {
            collection: Collection::Ledger,
            id: "o".to_owned(),
            expected: slotkeeper_store::Expected::Revision(1),
            found: slotkeeper_store::Expected::Revision(2),
        });
        assert!(conflict.is_transient());
        assert!(CoreError::Store(StoreError::Injected("x".to_owned())).is_transient());
        assert!(!CoreError::Store(StoreError::InvalidId("x".to_owned())).is_transient());
        assert!(!CoreError::Validation("amount".to_owned()).is_transient());
        assert!(!CoreError::CapacityExceeded {
            occurrence: OccurrenceId::new("o"),
            requested: 1,
            remaining: 0
        }
        .is_transient());
    }
}
