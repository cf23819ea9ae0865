//! Entities, identifiers, reservation states, and the specification algebra for Slotkeeper.
//!
//! This crate defines the schema layer: string-newtype identifiers, the
//! `User`, `Occurrence`, `Reservation` and `CapacityEntry` records, the
//! reservation state transition table, and `Specification<T>`, the composable
//! predicate used by every read path to select entities.

pub mod occurrence;
pub mod reservation;
pub mod spec;
pub mod types;
pub mod user;
pub mod value;

pub use occurrence::{CapacityEntry, Occurrence, OccurrenceField};
pub use reservation::{Reservation, ReservationField, ReservationState};
pub use spec::{Comparison, Criterion, Field, Queryable, SoftDeletable, Specification};
pub use types::{ActivityId, OccurrenceId, ReservationId, UserId};
pub use user::{normalize_email, EmailClaim, User, UserField};
pub use value::{Value, ValueKind};
