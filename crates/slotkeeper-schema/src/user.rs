use crate::spec::{Field, Queryable, SoftDeletable, Specification};
use crate::types::UserId;
use crate::value::{Value, ValueKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A registered account, reduced to what booking and cleanup need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub email_confirmed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(email: &str, display_name: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: UserId::generate(),
            email: normalize_email(email),
            display_name: display_name.to_owned(),
            email_confirmed: false,
            created_at,
            deleted_at: None,
        }
    }
}

/// Lowercased, trimmed form under which addresses are compared.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Ownership of one email address by one account.
///
/// Stored under a digest of the normalized address, so registrations of the
/// same address always contend on the same record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailClaim {
    pub key: String,
    pub email: String,
    pub user_id: UserId,
}

impl EmailClaim {
    pub fn new(user: &User) -> Self {
        Self {
            key: Self::key_for(&user.email),
            email: user.email.clone(),
            user_id: user.id.clone(),
        }
    }

    /// Record key of the claim on `email`.
    pub fn key_for(email: &str) -> String {
        blake3::hash(normalize_email(email).as_bytes())
            .to_hex()
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserField {
    Id,
    Email,
    EmailConfirmed,
    CreatedAt,
    DeletedAt,
}

impl fmt::Display for UserField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserField::Id => write!(f, "id"),
            UserField::Email => write!(f, "email"),
            UserField::EmailConfirmed => write!(f, "email_confirmed"),
            UserField::CreatedAt => write!(f, "created_at"),
            UserField::DeletedAt => write!(f, "deleted_at"),
        }
    }
}

impl Field for UserField {
    fn kind(self) -> ValueKind {
        match self {
            UserField::Id | UserField::Email => ValueKind::Text,
            UserField::EmailConfirmed => ValueKind::Bool,
            UserField::CreatedAt | UserField::DeletedAt => ValueKind::Timestamp,
        }
    }

    fn nullable(self) -> bool {
        self == UserField::DeletedAt
    }
}

impl Queryable for User {
    type Field = UserField;

    fn value(&self, field: UserField) -> Value {
        match field {
            UserField::Id => (&self.id).into(),
            UserField::Email => self.email.as_str().into(),
            UserField::EmailConfirmed => self.email_confirmed.into(),
            UserField::CreatedAt => self.created_at.into(),
            UserField::DeletedAt => self.deleted_at.into(),
        }
    }
}

impl SoftDeletable for User {
    const DELETED_AT: UserField = UserField::DeletedAt;

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }
}

/// Accounts whose email address was never confirmed.
pub fn unverified() -> Specification<User> {
    Specification::field_eq(UserField::EmailConfirmed, false).named("unverified")
}

pub fn created_before(cutoff: DateTime<Utc>) -> Specification<User> {
    Specification::field_before(UserField::CreatedAt, cutoff).named("created before")
}

pub fn with_email(email: &str) -> Specification<User> {
    Specification::field_eq(UserField::Email, normalize_email(email))
}
