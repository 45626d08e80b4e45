//! Ride chat messages.
//!
//! Messages are append-only: the message watcher only ever filters by
//! `created_at`, never diffs or rewrites them.

use crate::ride::{RideId, UserId};
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Unexpected};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who posted a message: a user, or the system on the ledger's behalf.
///
/// Serialized as the literal string `"system"` or the numeric user id,
/// matching the stored document shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Sender {
    /// Synthetic messages appended by the ledger (e.g. ride-updated notices).
    System,
    /// A regular participant.
    User(UserId),
}

impl Sender {
    /// Whether the message was generated by the system.
    #[must_use]
    pub const fn is_system(self) -> bool {
        matches!(self, Self::System)
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User(id) => write!(f, "{id}"),
        }
    }
}

impl Serialize for Sender {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::System => serializer.serialize_str("system"),
            Self::User(id) => serializer.serialize_i64(id.value()),
        }
    }
}

impl<'de> Deserialize<'de> for Sender {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SenderVisitor;

        impl de::Visitor<'_> for SenderVisitor {
            type Value = Sender;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("\"system\" or a numeric user id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Sender, E> {
                if v == "system" {
                    Ok(Sender::System)
                } else {
                    Err(E::invalid_value(Unexpected::Str(v), &self))
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Sender, E> {
                Ok(Sender::User(UserId::new(v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Sender, E> {
                i64::try_from(v)
                    .map(|id| Sender::User(UserId::new(id)))
                    .map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
            }
        }

        deserializer.deserialize_any(SenderVisitor)
    }
}

/// A chat entry tied to a ride. Append-only; no edits or deletes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// The ride this message belongs to.
    pub ride_id: RideId,
    /// Who posted it.
    pub sender_id: Sender,
    /// Display name of the sender.
    pub sender_name: String,
    /// Message body.
    pub text: String,
    /// Append timestamp.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn system_sender_round_trips_as_string() {
        let json = serde_json::to_string(&Sender::System).unwrap();
        assert_eq!(json, "\"system\"");
        let back: Sender = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Sender::System);
        assert!(back.is_system());
    }

    #[test]
    fn user_sender_round_trips_as_number() {
        let sender = Sender::User(UserId::new(123_456));
        let json = serde_json::to_string(&sender).unwrap();
        assert_eq!(json, "123456");
        let back: Sender = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sender);
        assert!(!back.is_system());
    }

    #[test]
    fn unknown_string_sender_is_rejected() {
        assert!(serde_json::from_str::<Sender>("\"admin\"").is_err());
    }
}
