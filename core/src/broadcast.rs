//! Ephemeral global broadcast notices.

use crate::ride::UserId;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Default freshness window for broadcast messages, in seconds.
pub const DEFAULT_FRESHNESS_SECONDS: i64 = 30;

/// A global notice consumed by active sessions only while fresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMessage {
    /// Notice body.
    pub message: String,
    /// Originating actor; subscribers suppress their own broadcasts.
    pub created_by: UserId,
    /// Publish timestamp.
    pub created_at: DateTime<Utc>,
}

impl BroadcastMessage {
    /// Whether the message is still inside the freshness window.
    ///
    /// Anything older is silently dropped; this bounds notification storms
    /// on reconnect/replay and tolerates moderate clock skew.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        now - self.created_at <= window
    }
}
