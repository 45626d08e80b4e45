//! Recording messenger for asserting on outbound notifications.

use ridepool_core::ride::UserId;
use ridepool_core::transport::{DeliveryReceipt, Messenger, TransportError};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// A [`Messenger`] that records every send and can simulate unreachable
/// recipients or a failing transport.
///
/// # Example
///
/// ```
/// use ridepool_testing::RecordingMessenger;
/// use ridepool_core::ride::UserId;
/// use ridepool_core::transport::Messenger;
///
/// # async fn example() {
/// let messenger = RecordingMessenger::new();
/// messenger.send(UserId::new(123_456), "hello").await.unwrap();
/// assert_eq!(messenger.sent(), vec![(UserId::new(123_456), "hello".to_string())]);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct RecordingMessenger {
    sent: Arc<Mutex<Vec<(UserId, String)>>>,
    unreachable: Arc<Mutex<HashSet<UserId>>>,
    transport_down: Arc<Mutex<bool>>,
}

impl RecordingMessenger {
    /// Create a messenger that delivers everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(recipient, text)` pairs that were actually delivered, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<(UserId, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts delivered to one recipient, in order.
    #[must_use]
    pub fn sent_to(&self, recipient: UserId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == recipient)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Mark a recipient as permanently unreachable (blocked).
    pub fn mark_unreachable(&self, recipient: UserId) {
        self.unreachable.lock().unwrap().insert(recipient);
    }

    /// Make every subsequent send fail at the transport level.
    pub fn set_transport_down(&self, down: bool) {
        *self.transport_down.lock().unwrap() = down;
    }

    /// Forget all recorded sends (for test isolation).
    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl Messenger for RecordingMessenger {
    fn send(
        &self,
        recipient: UserId,
        text: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryReceipt, TransportError>> + Send + '_>> {
        let result = if *self.transport_down.lock().unwrap() {
            Err(TransportError("simulated outage".to_string()))
        } else if self.unreachable.lock().unwrap().contains(&recipient) {
            Ok(DeliveryReceipt::unreachable("recipient blocked delivery"))
        } else {
            self.sent.lock().unwrap().push((recipient, text.to_string()));
            Ok(DeliveryReceipt::delivered())
        };
        Box::pin(async move { result })
    }
}
