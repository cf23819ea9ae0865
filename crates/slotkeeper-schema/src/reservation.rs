use crate::spec::{Field, Queryable, SoftDeletable, Specification};
use crate::types::{OccurrenceId, ReservationId, UserId};
use crate::value::{Value, ValueKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReservationState {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl ReservationState {
    pub const ALL: [ReservationState; 4] = [
        ReservationState::Pending,
        ReservationState::Confirmed,
        ReservationState::Completed,
        ReservationState::Cancelled,
    ];

    /// The transition table. Completed and Cancelled are terminal.
    pub fn can_transition_to(self, to: ReservationState) -> bool {
        matches!(
            (self, to),
            (
                ReservationState::Pending,
                ReservationState::Confirmed | ReservationState::Cancelled
            ) | (
                ReservationState::Confirmed,
                ReservationState::Completed | ReservationState::Cancelled
            )
        )
    }

    /// Whether a reservation in this state may be permanently removed.
    pub fn is_retired(self) -> bool {
        matches!(
            self,
            ReservationState::Completed | ReservationState::Cancelled
        )
    }

    /// Whether this state holds admitted capacity in the ledger.
    pub fn holds_capacity(self) -> bool {
        matches!(
            self,
            ReservationState::Confirmed | ReservationState::Completed
        )
    }
}

impl fmt::Display for ReservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationState::Pending => write!(f, "pending"),
            ReservationState::Confirmed => write!(f, "confirmed"),
            ReservationState::Completed => write!(f, "completed"),
            ReservationState::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for ReservationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" | "pending" => Ok(ReservationState::Pending),
            "Confirmed" | "confirmed" => Ok(ReservationState::Confirmed),
            "Completed" | "completed" => Ok(ReservationState::Completed),
            "Cancelled" | "cancelled" | "canceled" => Ok(ReservationState::Cancelled),
            other => Err(format!("unknown reservation state '{other}'")),
        }
    }
}

/// A booking of `amount` places on one occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub user_id: UserId,
    pub occurrence_id: OccurrenceId,
    /// Number of children booked; always at least one.
    pub amount: u32,
    #[serde(default)]
    pub comment: String,
    pub state: ReservationState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// A fresh Pending reservation. Amount validation is the caller's job.
    pub fn pending(
        user_id: UserId,
        occurrence_id: OccurrenceId,
        amount: u32,
        comment: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::generate(),
            user_id,
            occurrence_id,
            amount,
            comment: comment.trim().to_owned(),
            state: ReservationState::Pending,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationField {
    Id,
    UserId,
    OccurrenceId,
    Amount,
    State,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}

impl fmt::Display for ReservationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationField::Id => write!(f, "id"),
            ReservationField::UserId => write!(f, "user_id"),
            ReservationField::OccurrenceId => write!(f, "occurrence_id"),
            ReservationField::Amount => write!(f, "amount"),
            ReservationField::State => write!(f, "state"),
            ReservationField::CreatedAt => write!(f, "created_at"),
            ReservationField::UpdatedAt => write!(f, "updated_at"),
            ReservationField::DeletedAt => write!(f, "deleted_at"),
        }
    }
}

impl Field for ReservationField {
    fn kind(self) -> ValueKind {
        match self {
            ReservationField::Id
            | ReservationField::UserId
            | ReservationField::OccurrenceId
            | ReservationField::State => ValueKind::Text,
            ReservationField::Amount => ValueKind::Int,
            ReservationField::CreatedAt
            | ReservationField::UpdatedAt
            | ReservationField::DeletedAt => ValueKind::Timestamp,
        }
    }

    fn nullable(self) -> bool {
        self == ReservationField::DeletedAt
    }
}

impl Queryable for Reservation {
    type Field = ReservationField;

    fn value(&self, field: ReservationField) -> Value {
        match field {
            ReservationField::Id => (&self.id).into(),
            ReservationField::UserId => (&self.user_id).into(),
            ReservationField::OccurrenceId => (&self.occurrence_id).into(),
            ReservationField::Amount => self.amount.into(),
            ReservationField::State => self.state.to_string().into(),
            ReservationField::CreatedAt => self.created_at.into(),
            ReservationField::UpdatedAt => self.updated_at.into(),
            ReservationField::DeletedAt => self.deleted_at.into(),
        }
    }
}

impl SoftDeletable for Reservation {
    const DELETED_AT: ReservationField = ReservationField::DeletedAt;

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }
}

pub fn for_occurrence(occurrence_id: &OccurrenceId) -> Specification<Reservation> {
    Specification::field_eq(ReservationField::OccurrenceId, occurrence_id)
}

pub fn for_user(user_id: &UserId) -> Specification<Reservation> {
    Specification::field_eq(ReservationField::UserId, user_id)
}

pub fn in_state(state: ReservationState) -> Specification<Reservation> {
    Specification::field_eq(ReservationField::State, state.to_string()).named(state.to_string())
}

pub fn created_before(cutoff: DateTime<Utc>) -> Specification<Reservation> {
    Specification::field_before(ReservationField::CreatedAt, cutoff)
}
