//! Common type definitions shared across the portal.
//!
//! All entity IDs are UUIDs behind type aliases:
//!
//! - [`UserId`]: portal account identifier
//! - [`RequestId`]: client project request
//! - [`ProjectId`]: contracted project
//! - [`InvoiceId`], [`PaymentId`], [`TransferId`]: billing records
//!
//! [`Operation`] names the kind of action an authorization failure refers to.

use serde::Deserialize;
use std::fmt;
use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type RequestId = Uuid;
pub type ProjectId = Uuid;
pub type InvoiceId = Uuid;
pub type PaymentId = Uuid;
pub type TransferId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub enum CurrentKeyword {
    #[serde(rename = "current")]
    Current,
}

/// Lets `/users/current` and `/users/{user_id}` hit the same handler.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UserIdOrCurrent {
    Current(CurrentKeyword),
    Id(UserId),
}

impl UserIdOrCurrent {
    /// Resolve against the id of the caller
    pub fn resolve(&self, current: UserId) -> UserId {
        match self {
            UserIdOrCurrent::Current(_) => current,
            UserIdOrCurrent::Id(id) => *id,
        }
    }
}

/// Operations that can be refused to a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
    Export,
    Pay,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Read => "read",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Export => "export",
            Operation::Pay => "pay for",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbrev_uuid() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&uuid), "550e8400");
    }

    #[test]
    fn test_user_id_or_current() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        let current: UserIdOrCurrent = serde_json::from_str("\"current\"").unwrap();
        assert_eq!(current.resolve(me), me);

        let explicit: UserIdOrCurrent = serde_json::from_str(&format!("\"{other}\"")).unwrap();
        assert_eq!(explicit.resolve(me), other);
    }
}
