//! Outbound messaging transport contract.
//!
//! Delivery is fire-and-forget: the dispatcher makes one call per recipient
//! and never retries. The core only ever inspects the delivered/permanent
//! distinction on the receipt, never transport-specific status codes.

use crate::ride::UserId;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Outcome of a single delivery attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// The message reached the recipient.
    pub delivered: bool,
    /// The recipient is unreachable or has blocked delivery; retrying is
    /// pointless until they re-enable it, which is outside this system's
    /// control.
    pub permanent_failure: bool,
    /// Transport-provided detail for logging.
    pub detail: Option<String>,
}

impl DeliveryReceipt {
    /// A successful delivery.
    #[must_use]
    pub const fn delivered() -> Self {
        Self {
            delivered: true,
            permanent_failure: false,
            detail: None,
        }
    }

    /// The recipient is unreachable (blocked, deactivated).
    #[must_use]
    pub fn unreachable(detail: impl Into<String>) -> Self {
        Self {
            delivered: false,
            permanent_failure: true,
            detail: Some(detail.into()),
        }
    }
}

/// Transport-level failure (network, timeout). Logged and swallowed by the
/// dispatcher; never retried and never propagated to ledger callers.
#[derive(Error, Debug, Clone)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

/// Contract for the external push-notification transport.
pub trait Messenger: Send + Sync {
    /// Send one text message to one recipient.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the transport itself fails; rejection
    /// by the recipient is reported through the receipt instead.
    fn send(
        &self,
        recipient: UserId,
        text: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryReceipt, TransportError>> + Send + '_>>;
}
