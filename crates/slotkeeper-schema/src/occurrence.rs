use crate::spec::{Field, Queryable, SoftDeletable, Specification};
use crate::types::{ActivityId, OccurrenceId};
use crate::value::{Value, ValueKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A scheduled date/time instance of an activity; the unit capacity is tracked against.
///
/// Used capacity is not stored here. It lives in the ledger as a
/// [`CapacityEntry`] and only changes through admit/release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: OccurrenceId,
    pub activity_id: ActivityId,
    pub starts_at: DateTime<Utc>,
    pub maximum_capacity: u32,
    /// Proposed but not yet approved; nothing is admitted while set.
    #[serde(default)]
    pub pending: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Occurrence {
    pub fn new(
        activity_id: ActivityId,
        starts_at: DateTime<Utc>,
        maximum_capacity: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OccurrenceId::generate(),
            activity_id,
            starts_at,
            maximum_capacity,
            pending: false,
            created_at,
            deleted_at: None,
        }
    }

    /// Whether the occurrence takes part in capacity accounting.
    pub fn is_bookable(&self) -> bool {
        !self.pending && self.deleted_at.is_none()
    }
}

/// Ledger record holding the admitted capacity of one occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityEntry {
    pub occurrence_id: OccurrenceId,
    pub used_capacity: u32,
    pub updated_at: DateTime<Utc>,
}

impl CapacityEntry {
    pub fn empty(occurrence_id: OccurrenceId) -> Self {
        Self {
            occurrence_id,
            used_capacity: 0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrenceField {
    Id,
    ActivityId,
    StartsAt,
    Pending,
    CreatedAt,
    DeletedAt,
}

impl fmt::Display for OccurrenceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OccurrenceField::Id => write!(f, "id"),
            OccurrenceField::ActivityId => write!(f, "activity_id"),
            OccurrenceField::StartsAt => write!(f, "starts_at"),
            OccurrenceField::Pending => write!(f, "pending"),
            OccurrenceField::CreatedAt => write!(f, "created_at"),
            OccurrenceField::DeletedAt => write!(f, "deleted_at"),
        }
    }
}

impl Field for OccurrenceField {
    fn kind(self) -> ValueKind {
        match self {
            OccurrenceField::Id | OccurrenceField::ActivityId => ValueKind::Text,
            OccurrenceField::Pending => ValueKind::Bool,
            OccurrenceField::StartsAt
            | OccurrenceField::CreatedAt
            | OccurrenceField::DeletedAt => ValueKind::Timestamp,
        }
    }

    fn nullable(self) -> bool {
        self == OccurrenceField::DeletedAt
    }
}

impl Queryable for Occurrence {
    type Field = OccurrenceField;

    fn value(&self, field: OccurrenceField) -> Value {
        match field {
            OccurrenceField::Id => (&self.id).into(),
            OccurrenceField::ActivityId => (&self.activity_id).into(),
            OccurrenceField::StartsAt => self.starts_at.into(),
            OccurrenceField::Pending => self.pending.into(),
            OccurrenceField::CreatedAt => self.created_at.into(),
            OccurrenceField::DeletedAt => self.deleted_at.into(),
        }
    }
}

impl SoftDeletable for Occurrence {
    const DELETED_AT: OccurrenceField = OccurrenceField::DeletedAt;

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }
}

pub fn for_activity(activity_id: &ActivityId) -> Specification<Occurrence> {
    Specification::field_eq(OccurrenceField::ActivityId, activity_id)
}

pub fn starts_before(cutoff: DateTime<Utc>) -> Specification<Occurrence> {
    Specification::field_before(OccurrenceField::StartsAt, cutoff).named("started")
}

/// Approved occurrences, i.e. those counted in public capacity accounting.
pub fn approved() -> Specification<Occurrence> {
    Specification::field_eq(OccurrenceField::Pending, false).named("approved")
}
