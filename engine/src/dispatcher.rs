//! Outbound notification fan-out.
//!
//! Two halves: [`recipients`], a pure mapping from a semantic event to
//! `(recipient, text)` pairs, and [`NotificationDispatcher`], the delivery
//! loop. Delivery is fire-and-forget: one transport call per recipient, no
//! retries, no backoff. The persisted ride state is the source of truth and
//! notifications are a best-effort convenience layer on top of it.

use ridepool_core::event::RideEvent;
use ridepool_core::message::Sender;
use ridepool_core::ride::{RequestStatus, Ride, UserId};
use ridepool_core::transport::Messenger;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Map one event to its `(recipient, text)` pairs.
///
/// Pure and deterministic; the delivery loop applies routability filtering
/// and transport handling separately.
#[must_use]
pub fn recipients(event: &RideEvent) -> Vec<(UserId, String)> {
    match event {
        RideEvent::RequestCreated { ride, request } => vec![(
            ride.author_id,
            format!(
                "{} wants to join your ride to {} at {}",
                request.name, ride.destination, ride.time
            ),
        )],
        RideEvent::RequestStatusChanged {
            ride,
            request,
            new_status,
            ..
        } => match new_status {
            RequestStatus::Approved => vec![(
                request.user_id,
                format!(
                    "Your request for the ride to {} at {} was approved",
                    ride.destination, ride.time
                ),
            )],
            RequestStatus::Rejected => vec![(
                request.user_id,
                format!(
                    "Your request for the ride to {} at {} was rejected",
                    ride.destination, ride.time
                ),
            )],
            RequestStatus::Pending => vec![],
        },
        RideEvent::MessagePosted { ride, message } => participants(ride)
            .filter(|id| message.sender_id != Sender::User(*id))
            .map(|id| {
                (
                    id,
                    format!(
                        "{} in the ride to {} at {}: {}",
                        message.sender_name, ride.destination, ride.time, message.text
                    ),
                )
            })
            .collect(),
        RideEvent::DepartureReminder { ride } => participants(ride)
            .map(|id| {
                (
                    id,
                    format!(
                        "Reminder: your ride to {} departs at {}",
                        ride.destination, ride.time
                    ),
                )
            })
            .collect(),
        // Deletion notices are not mapped to anyone.
        RideEvent::RideRemoved { .. } => vec![],
    }
}

/// Author plus approved requesters, deduplicated by construction (an author
/// never appears in their own request queue).
fn participants(ride: &Ride) -> impl Iterator<Item = UserId> + '_ {
    std::iter::once(ride.author_id).chain(ride.approved_requests().map(|r| r.user_id))
}

/// Delivery loop draining the event channel into the transport.
pub struct NotificationDispatcher {
    messenger: Arc<dyn Messenger>,
}

impl NotificationDispatcher {
    /// Create a dispatcher over the given transport.
    #[must_use]
    pub fn new(messenger: Arc<dyn Messenger>) -> Self {
        Self { messenger }
    }

    /// Deliver one event's notifications.
    pub async fn dispatch(&self, event: &RideEvent) {
        for (recipient, text) in recipients(event) {
            self.deliver(recipient, &text).await;
        }
    }

    /// Drain the channel until it closes, dispatching every event.
    #[must_use]
    pub fn spawn(self, mut events: mpsc::Receiver<RideEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                tracing::debug!(event = event.kind(), "dispatching notifications");
                self.dispatch(&event).await;
            }
            tracing::info!("event channel closed, dispatcher exiting");
        })
    }

    async fn deliver(&self, recipient: UserId, text: &str) {
        if !recipient.is_routable() {
            tracing::debug!(recipient = %recipient, "skipping non-routable recipient");
            return;
        }
        match self.messenger.send(recipient, text).await {
            Ok(receipt) if receipt.delivered => {
                tracing::debug!(recipient = %recipient, "notification delivered");
            }
            Ok(receipt) if receipt.permanent_failure => {
                tracing::info!(
                    recipient = %recipient,
                    detail = receipt.detail.as_deref().unwrap_or(""),
                    "recipient unreachable, not retrying"
                );
            }
            Ok(receipt) => {
                tracing::warn!(
                    recipient = %recipient,
                    detail = receipt.detail.as_deref().unwrap_or(""),
                    "notification not delivered"
                );
            }
            Err(e) => {
                tracing::warn!(recipient = %recipient, error = %e, "transport failure, notification dropped");
            }
        }
    }
}
