//! Global broadcast fan-out with a freshness window.
//!
//! Any process may publish a notice; subscribers only surface notices
//! created within the last 30 seconds of their own clock and never their own
//! notices. The window bounds notification storms on reconnect/replay and
//! tolerates moderate clock skew.

use chrono::TimeDelta;
use futures::{Stream, StreamExt};
use ridepool_core::broadcast::BroadcastMessage;
use ridepool_core::environment::Clock;
use ridepool_core::ride::UserId;
use ridepool_core::store::{CollectionChange, DocumentStore, StoreError, collections};
use std::pin::Pin;
use std::sync::Arc;

/// Stream of fresh, not-self-originated broadcast notices.
pub type BroadcastStream = Pin<Box<dyn Stream<Item = BroadcastMessage> + Send>>;

/// Publish/subscribe handle for the `broadcasts` collection.
#[derive(Clone)]
pub struct BroadcastChannel {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    freshness: TimeDelta,
}

impl BroadcastChannel {
    /// Create a channel over the given store with the given freshness window.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, freshness: TimeDelta) -> Self {
        Self {
            store,
            clock,
            freshness,
        }
    }

    /// Publish a notice on behalf of `created_by`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the notice cannot be persisted.
    pub async fn publish(
        &self,
        created_by: UserId,
        message: impl Into<String>,
    ) -> Result<(), StoreError> {
        let notice = BroadcastMessage {
            message: message.into(),
            created_by,
            created_at: self.clock.now(),
        };
        let doc = serde_json::to_value(&notice)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let id = self.store.insert(collections::BROADCASTS, doc).await?;
        tracing::debug!(broadcast_id = %id, created_by = %created_by, "broadcast published");
        Ok(())
    }

    /// Subscribe as `subscriber`.
    ///
    /// The stream applies the freshness filter at evaluation time and
    /// suppresses notices the subscriber itself originated. Stale notices
    /// (including the initial snapshot replay) are silently dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the subscription cannot be established.
    pub async fn subscribe(&self, subscriber: UserId) -> Result<BroadcastStream, StoreError> {
        let mut changes = self.store.watch(collections::BROADCASTS).await?;
        let clock = Arc::clone(&self.clock);
        let freshness = self.freshness;

        let stream = async_stream::stream! {
            while let Some(item) = changes.next().await {
                match item {
                    // Broadcasts are append-only; only additions matter.
                    Ok(CollectionChange::Added { doc, .. }) => {
                        match serde_json::from_value::<BroadcastMessage>(doc) {
                            Ok(notice) => {
                                if notice.created_by == subscriber {
                                    continue;
                                }
                                if !notice.is_fresh(clock.now(), freshness) {
                                    continue;
                                }
                                yield notice;
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "skipping malformed broadcast");
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "broadcast stream error");
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
