//! Composable, side-effect-free entity predicates.
//!
//! A [`Specification`] is a flat conjunction of leaf [`Criterion`]s over the
//! fields an entity exposes through [`Queryable`]. Combining two
//! specifications concatenates their criteria into a new value, so `and` is
//! associative by construction and never mutates its operands. The same
//! evaluation semantics apply to every caller: cleanup jobs, admin filters,
//! and the reservation engine's own candidate selection.

use crate::value::{Value, ValueKind};
use chrono::{DateTime, Utc};
use std::fmt;
use std::ops::BitAnd;

/// A closed set of named fields belonging to one entity type.
pub trait Field: Copy + Eq + fmt::Debug + fmt::Display + 'static {
    /// Kind of the non-null values this field produces.
    fn kind(self) -> ValueKind;

    /// Whether the field can be null.
    fn nullable(self) -> bool {
        false
    }
}

/// An entity whose fields can be inspected by a [`Specification`].
pub trait Queryable {
    type Field: Field;

    fn value(&self, field: Self::Field) -> Value;
}

/// An entity carrying a deleted-at marker.
pub trait SoftDeletable: Queryable {
    /// The field holding the deleted-at marker.
    const DELETED_AT: Self::Field;

    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    fn mark_deleted(&mut self, at: DateTime<Utc>);

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}

/// Leaf comparison applied to a single field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Equals(Value),
    Before(DateTime<Utc>),
    After(DateTime<Utc>),
    IsNull,
    IsNotNull,
}

impl Comparison {
    fn holds(&self, value: &Value) -> bool {
        match self {
            Comparison::Equals(expected) => value == expected,
            Comparison::Before(cutoff) => value.as_timestamp().is_some_and(|t| t < *cutoff),
            Comparison::After(cutoff) => value.as_timestamp().is_some_and(|t| t > *cutoff),
            Comparison::IsNull => value.is_null(),
            Comparison::IsNotNull => !value.is_null(),
        }
    }
}

/// One leaf of a specification: `field <comparison>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criterion<F> {
    pub field: F,
    pub comparison: Comparison,
}

impl<F: Field> fmt::Display for Criterion<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.comparison {
            Comparison::Equals(v) => write!(f, "{} = {v}", self.field),
            Comparison::Before(t) => write!(f, "{} < {}", self.field, t.to_rfc3339()),
            Comparison::After(t) => write!(f, "{} > {}", self.field, t.to_rfc3339()),
            Comparison::IsNull => write!(f, "{} IS NULL", self.field),
            Comparison::IsNotNull => write!(f, "{} IS NOT NULL", self.field),
        }
    }
}

/// An immutable predicate over `T`.
pub struct Specification<T: Queryable> {
    name: Option<String>,
    criteria: Vec<Criterion<T::Field>>,
}

impl<T: Queryable> Specification<T> {
    /// The specification every entity satisfies; identity of [`and`](Self::and).
    pub fn all() -> Self {
        Self {
            name: None,
            criteria: Vec::new(),
        }
    }

    fn leaf(field: T::Field, comparison: Comparison) -> Self {
        Self {
            name: None,
            criteria: vec![Criterion { field, comparison }],
        }
    }

    /// `field = value`.
    pub fn field_eq(field: T::Field, value: impl Into<Value>) -> Self {
        let value = value.into();
        debug_assert_eq!(
            value.kind(),
            Some(field.kind()),
            "value {value} does not fit field {field}"
        );
        Self::leaf(field, Comparison::Equals(value))
    }

    /// `field < cutoff`; null values never match.
    pub fn field_before(field: T::Field, cutoff: DateTime<Utc>) -> Self {
        debug_assert_eq!(field.kind(), ValueKind::Timestamp, "{field} is not a timestamp");
        Self::leaf(field, Comparison::Before(cutoff))
    }

    /// `field > cutoff`; null values never match.
    pub fn field_after(field: T::Field, cutoff: DateTime<Utc>) -> Self {
        debug_assert_eq!(field.kind(), ValueKind::Timestamp, "{field} is not a timestamp");
        Self::leaf(field, Comparison::After(cutoff))
    }

    pub fn field_is_null(field: T::Field) -> Self {
        debug_assert!(field.nullable(), "{field} is never null");
        Self::leaf(field, Comparison::IsNull)
    }

    pub fn field_is_not_null(field: T::Field) -> Self {
        debug_assert!(field.nullable(), "{field} is never null");
        Self::leaf(field, Comparison::IsNotNull)
    }

    /// Label this specification for logs and reports.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Conjunction of `self` and `other` as a new specification.
    #[must_use]
    pub fn and(&self, other: &Self) -> Self {
        let mut criteria = Vec::with_capacity(self.criteria.len() + other.criteria.len());
        criteria.extend(self.criteria.iter().cloned());
        criteria.extend(other.criteria.iter().cloned());
        let name = match (&self.name, &other.name) {
            (Some(a), Some(b)) => Some(format!("{a} and {b}")),
            _ => None,
        };
        Self { name, criteria }
    }

    pub fn matches(&self, entity: &T) -> bool {
        self.criteria
            .iter()
            .all(|c| c.comparison.holds(&entity.value(c.field)))
    }

    /// Keep the entities that satisfy this specification, preserving order.
    pub fn select(&self, entities: impl IntoIterator<Item = T>) -> Vec<T> {
        entities.into_iter().filter(|e| self.matches(e)).collect()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn criteria(&self) -> &[Criterion<T::Field>] {
        &self.criteria
    }

    /// Render the criteria, e.g. `email_confirmed = false AND deleted_at IS NULL`.
    pub fn describe(&self) -> String {
        if self.criteria.is_empty() {
            return "TRUE".to_owned();
        }
        self.criteria
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

impl<T: SoftDeletable> Specification<T> {
    /// Entities without a deleted-at marker.
    pub fn not_deleted() -> Self {
        Self::field_is_null(T::DELETED_AT).named("not deleted")
    }
}

impl<T: Queryable> Clone for Specification<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            criteria: self.criteria.clone(),
        }
    }
}

impl<T: Queryable> Default for Specification<T> {
    fn default() -> Self {
        Self::all()
    }
}

impl<T: Queryable> fmt::Debug for Specification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Specification")
            .field("name", &self.name)
            .field("criteria", &self.describe())
            .finish()
    }
}

impl<T: Queryable> fmt::Display for Specification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({})", self.describe()),
            None => f.write_str(&self.describe()),
        }
    }
}

impl<T: Queryable> BitAnd for Specification<T> {
    type Output = Specification<T>;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(&rhs)
    }
}

impl<T: Queryable> BitAnd for &Specification<T> {
    type Output = Specification<T>;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(rhs)
    }
}
