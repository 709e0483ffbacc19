//! Core types used throughout the system
//!
//! Identifiers for registrars, resources and the records hanging off a
//! transfer attempt. They are small, cheap to clone and serialize as plain
//! strings so they can be stored in JSON payload columns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Registrar ID - the EPP client identifier of a registrar.
///
/// # Constraints:
/// - **Immutable**: Assigned at registrar onboarding, never changes
/// - **Non-empty**: An empty id is never a logged-in registrar
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrarId(String);

impl RegistrarId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegistrarId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Kind of transferable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i16)]
pub enum ResourceKind {
    Domain = 1,
    Contact = 2,
}

impl ResourceKind {
    /// Numeric ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(ResourceKind::Domain),
            2 => Some(ResourceKind::Contact),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Domain => "domain",
            ResourceKind::Contact => "contact",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of a resource: its kind plus the EPP identifier
/// (fully qualified domain name or contact id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub id: String,
}

impl ResourceKey {
    pub fn domain(name: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Domain,
            // Domain names are case-insensitive
            id: name.into().to_ascii_lowercase(),
        }
    }

    pub fn contact(id: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Contact,
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Generates a ULID-backed identifier newtype.
///
/// ULIDs are monotonic and sortable, need no machine id coordination and
/// render as 26 character strings for storage.
macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(ulid::Ulid);

        impl $name {
            pub fn new() -> Self {
                Self(ulid::Ulid::new())
            }

            pub fn inner(&self) -> ulid::Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(ulid::Ulid::from_string(s)?))
            }
        }
    };
}

ulid_id!(
    /// Identifies one transfer attempt. A new request always gets a new id.
    TransferId
);

ulid_id!(
    /// Identifies a ledger record (poll message, billing event) or history entry.
    EntityId
);

/// Kind of record a speculative entity key points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    PollMessage,
    BillingEvent,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::PollMessage => f.write_str("poll_message"),
            EntityKind::BillingEvent => f.write_str("billing_event"),
        }
    }
}

/// Typed reference to a ledger record. Used as a back-reference only; the
/// ledger tables own the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityKey {
    pub fn poll_message(id: EntityId) -> Self {
        Self {
            kind: EntityKind::PollMessage,
            id,
        }
    }

    pub fn billing_event(id: EntityId) -> Self {
        Self {
            kind: EntityKind::BillingEvent,
            id,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
