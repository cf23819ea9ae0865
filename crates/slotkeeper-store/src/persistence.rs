use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The persisted collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Collection {
    Users,
    EmailClaims,
    Occurrences,
    Reservations,
    Ledger,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Users,
        Collection::EmailClaims,
        Collection::Occurrences,
        Collection::Reservations,
        Collection::Ledger,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::EmailClaims => "email_claims",
            Collection::Occurrences => "occurrences",
            Collection::Reservations => "reservations",
            Collection::Ledger => "ledger",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Precondition a staged mutation places on the record it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expected {
    /// No precondition.
    Any,
    /// The record must not exist yet.
    Absent,
    /// The record must exist at exactly this revision.
    Revision(u64),
}

impl Expected {
    /// The observed state of a record as an `Expected` value.
    pub fn observed(current: Option<u64>) -> Self {
        current.map_or(Expected::Absent, Expected::Revision)
    }

    pub fn admits(self, current: Option<u64>) -> bool {
        match self {
            Expected::Any => true,
            Expected::Absent => current.is_none(),
            Expected::Revision(rev) => current == Some(rev),
        }
    }
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Any => write!(f, "any"),
            Expected::Absent => write!(f, "absent"),
            Expected::Revision(rev) => write!(f, "revision {rev}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationKind {
    Put(serde_json::Value),
    Remove,
}

/// One staged change to one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub collection: Collection,
    pub id: String,
    pub kind: MutationKind,
    pub expected: Expected,
}

impl Mutation {
    pub fn put(collection: Collection, id: &str, body: serde_json::Value, expected: Expected) -> Self {
        Self {
            collection,
            id: id.to_owned(),
            kind: MutationKind::Put(body),
            expected,
        }
    }

    pub fn remove(collection: Collection, id: &str, expected: Expected) -> Self {
        Self {
            collection,
            id: id.to_owned(),
            kind: MutationKind::Remove,
            expected,
        }
    }

    pub fn same_record(&self, other: &Mutation) -> bool {
        self.collection == other.collection && self.id == other.id
    }
}

/// A record as read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub revision: u64,
    pub body: serde_json::Value,
}

/// The boundary between the engine and durable storage.
///
/// Implementations must make [`apply`](Self::apply) atomic: every
/// precondition is checked before anything is written, and either all
/// mutations of the batch become visible or none do.
pub trait Persistence: Send + Sync {
    fn load(&self, collection: Collection, id: &str) -> Result<Option<StoredRecord>, StoreError>;

    /// All records of a collection in ascending id order.
    fn scan(&self, collection: Collection) -> Result<Vec<StoredRecord>, StoreError>;

    /// Apply a batch of mutations atomically. `label` names the batch in logs.
    fn apply(&self, label: &str, batch: &[Mutation]) -> Result<(), StoreError>;
}

/// Check every precondition of `batch` against the current revisions.
pub(crate) fn check_preconditions(
    batch: &[Mutation],
    mut current_revision: impl FnMut(Collection, &str) -> Result<Option<u64>, StoreError>,
) -> Result<(), StoreError> {
    for m in batch {
        if m.expected == Expected::Any {
            continue;
        }
        let current = current_revision(m.collection, &m.id)?;
        if !m.expected.admits(current) {
            return Err(StoreError::Conflict {
                collection: m.collection,
                id: m.id.clone(),
                expected: m.expected,
                found: Expected::observed(current),
            });
        }
    }
    Ok(())
}
