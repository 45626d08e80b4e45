//! Configuration management for the ridepool engine.
//!
//! Loads configuration from environment variables with sensible defaults.

use ridepool_core::ride::UserId;
use std::collections::HashSet;
use std::env;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// User ids allowed to delete any ride and to ban/unban users.
    pub moderators: HashSet<UserId>,
    /// Maximum concurrently active rides per author (default: 5).
    pub active_ride_limit: usize,
    /// Bounded retries for compare-and-swap conflicts (default: 5).
    pub cas_retries: u32,
    /// Minutes before departure at which the reminder fires (default: 15).
    pub reminder_lead_minutes: i64,
    /// Minutes past departure during which a ride stays listed (default: 10).
    pub visibility_grace_minutes: i64,
    /// Reminder scheduler tick period in seconds (default: 60).
    pub scheduler_period_secs: u64,
    /// Broadcast freshness window in seconds (default: 30).
    pub broadcast_freshness_secs: i64,
    /// Graceful shutdown timeout in seconds (default: 10).
    pub shutdown_timeout_secs: u64,
    /// Log level for the tracing subscriber (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Missing or unparseable variables fall back to the defaults;
    /// `RIDEPOOL_MODERATORS` is a comma-separated list of numeric user ids.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            moderators: env::var("RIDEPOOL_MODERATORS")
                .map(|s| {
                    s.split(',')
                        .filter_map(|part| part.trim().parse().ok())
                        .map(UserId::new)
                        .collect()
                })
                .unwrap_or_default(),
            active_ride_limit: env::var("RIDEPOOL_ACTIVE_RIDE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            cas_retries: env::var("RIDEPOOL_CAS_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            reminder_lead_minutes: env::var("RIDEPOOL_REMINDER_LEAD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(15),
            visibility_grace_minutes: env::var("RIDEPOOL_VISIBILITY_GRACE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            scheduler_period_secs: env::var("RIDEPOOL_SCHEDULER_PERIOD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            broadcast_freshness_secs: env::var("RIDEPOOL_BROADCAST_FRESHNESS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            shutdown_timeout_secs: env::var("RIDEPOOL_SHUTDOWN_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Whether the given user is a configured moderator.
    #[must_use]
    pub fn is_moderator(&self, user: UserId) -> bool {
        self.moderators.contains(&user)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            moderators: HashSet::new(),
            active_ride_limit: 5,
            cas_retries: 5,
            reminder_lead_minutes: 15,
            visibility_grace_minutes: 10,
            scheduler_period_secs: 60,
            broadcast_freshness_secs: 30,
            shutdown_timeout_secs: 10,
            log_level: "info".to_string(),
        }
    }
}
