//! Domain types for identity management with strong typing.
//!
//! Newtype wrappers keep account, avatar and session identifiers from being
//! mixed up, even though all three are UUIDs stored as text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role assigned when registration does not supply one.
pub const DEFAULT_ROLE: &str = "user";

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an account.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use gatehouse::domain::AccountId;
    ///
    /// let id = AccountId::generate();
    /// let parsed: AccountId = id.to_string().parse().unwrap();
    /// assert_eq!(id, parsed);
    /// ```
    AccountId
);

uuid_id!(
    /// Unique identifier for an avatar record.
    AvatarId
);

uuid_id!(
    /// Primary key of a session row. Not the opaque token handed to clients.
    SessionId
);

/// Normalizes an email for storage and lookup.
///
/// Emails are compared case-insensitively, so they are stored trimmed and
/// lower-cased and every lookup normalizes its input the same way.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Returns the role to persist, substituting [`DEFAULT_ROLE`] for empty input.
#[must_use]
pub fn role_or_default(role: Option<&str>) -> String {
    match role.map(str::trim) {
        Some(r) if !r.is_empty() => r.to_string(),
        _ => DEFAULT_ROLE.to_string(),
    }
}
