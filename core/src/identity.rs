//! Caller identity and moderation records.
//!
//! Identities are supplied by an external auth collaborator; this core never
//! authenticates them, it only compares ids for author/moderator gating.

use crate::ride::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The identity performing a ledger operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    /// Externally verified user id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Optional contact handle.
    pub telegram: Option<String>,
}

impl Caller {
    /// Convenience constructor.
    #[must_use]
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            telegram: None,
        }
    }

    /// Attach a contact handle.
    #[must_use]
    pub fn with_telegram(mut self, handle: impl Into<String>) -> Self {
        self.telegram = Some(handle.into());
        self
    }
}

/// A ban record; its presence in the `banned_users` collection denotes the ban.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanRecord {
    /// Display name of the banned user at ban time.
    pub name: String,
    /// Moderator who issued the ban.
    pub banned_by: UserId,
    /// When the ban was issued.
    pub banned_at: DateTime<Utc>,
}
