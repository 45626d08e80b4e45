//! Semantic change events reconstructed from snapshot diffs.
//!
//! These are not a durable change log: the detector derives them from
//! repeated full-state observations, and each transition is reported exactly
//! once per cache baseline.

use crate::message::Message;
use crate::ride::{Request, RequestStatus, Ride, RideId};
use serde::{Deserialize, Serialize};

/// A discrete change observed in the ride collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RideEvent {
    /// A new join request appeared on a ride.
    RequestCreated {
        /// The ride as currently observed.
        ride: Ride,
        /// The new request.
        request: Request,
    },
    /// An existing request's status flipped.
    RequestStatusChanged {
        /// The ride as currently observed.
        ride: Ride,
        /// The request after the flip.
        request: Request,
        /// Status before the flip.
        old_status: RequestStatus,
        /// Status after the flip.
        new_status: RequestStatus,
    },
    /// A new chat message was appended to a ride.
    MessagePosted {
        /// The ride the message belongs to.
        ride: Ride,
        /// The appended message.
        message: Message,
    },
    /// The ride departs soon; sent at most once per ride.
    DepartureReminder {
        /// The matching ride.
        ride: Ride,
    },
    /// A ride disappeared from the observed snapshot. Carries no
    /// notification mapping; ledger-level deletion notices are out of scope.
    RideRemoved {
        /// Id of the vanished ride.
        ride_id: RideId,
    },
}

impl RideEvent {
    /// Short event name for structured logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RequestCreated { .. } => "request_created",
            Self::RequestStatusChanged { .. } => "request_status_changed",
            Self::MessagePosted { .. } => "message_posted",
            Self::DepartureReminder { .. } => "departure_reminder",
            Self::RideRemoved { .. } => "ride_removed",
        }
    }
}
