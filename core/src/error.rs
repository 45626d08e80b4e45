//! Ledger error taxonomy.

use crate::ride::UserId;
use crate::store::StoreError;
use thiserror::Error;

/// Errors returned synchronously by Ride Ledger operations.
///
/// Notification delivery failures never appear here: notifications are a
/// side effect, not a transactional participant, and are logged and
/// swallowed by the dispatcher.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// A required field is missing or malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Ride or request absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// The author already has too many concurrently active rides.
    #[error("author already has {active} active rides (limit {limit})")]
    QuotaExceeded {
        /// Active rides counted at check time.
        active: usize,
        /// Configured per-author limit.
        limit: usize,
    },

    /// Booking race lost: the ride was full at commit time.
    #[error("no seats left")]
    NoSeats,

    /// A request from this user already exists on the ride, whatever its
    /// status.
    #[error("user {0} has already requested this ride")]
    AlreadyRequested(UserId),

    /// Non-author/non-moderator attempting a privileged operation, or a
    /// banned caller.
    #[error("caller is not authorized for this operation")]
    Unauthorized,

    /// Underlying document store failure (including exhausted
    /// compare-and-swap retries).
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Build a [`LedgerError::NotFound`] for a missing ride.
    #[must_use]
    pub fn ride_not_found(id: &crate::ride::RideId) -> Self {
        Self::NotFound(format!("ride {id}"))
    }

    /// Build a [`LedgerError::NotFound`] for a missing request.
    #[must_use]
    pub fn request_not_found(ride: &crate::ride::RideId, user: UserId) -> Self {
        Self::NotFound(format!("request from {user} on ride {ride}"))
    }
}
