//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Produce a fresh identifier whose lexical order follows creation order.
///
/// Layout: `<utc timestamp, microseconds>-<8 hex chars of blake3>`. The digest
/// covers the timestamp, a process-wide sequence number, and the pid, so two
/// ids minted in the same microsecond still differ.
fn fresh_id(prefix: &str) -> String {
    let now = chrono::Utc::now();
    let seq = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let seed = format!(
        "{prefix}:{}:{seq}:{}",
        now.timestamp_nanos_opt().unwrap_or_default(),
        std::process::id()
    );
    format!(
        "{}-{}",
        now.format("%Y%m%d%H%M%S%6f"),
        &blake3::hash(seed.as_bytes()).to_hex()[..8]
    )
}

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Mint a new, time-ordered identifier.
            pub fn generate() -> Self {
                Self(fresh_id($prefix))
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for crate::value::Value {
            fn from(id: $name) -> Self {
                crate::value::Value::Text(id.0)
            }
        }

        impl From<&$name> for crate::value::Value {
            fn from(id: &$name) -> Self {
                crate::value::Value::Text(id.0.clone())
            }
        }
    };
}

string_newtype!(
    /// Identifier of a registered account.
    UserId,
    "user"
);

string_newtype!(
    /// Identifier of an activity definition (the parent of occurrences).
    ActivityId,
    "activity"
);

string_newtype!(
    /// Identifier of one scheduled date/time instance of an activity.
    OccurrenceId,
    "occurrence"
);

string_newtype!(
    /// Identifier of a booking.
    ReservationId,
    "reservation"
);
