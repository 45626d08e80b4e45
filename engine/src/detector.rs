//! Change detection over repeated full-state snapshots.
//!
//! The store exposes no change log for request-level transitions, only
//! whole-document change streams. [`DiffCache`] reconstructs discrete
//! [`RideEvent`]s by diffing each observed ride against its last-observed
//! request list; [`ChangeDetector`] drives the cache from the store's
//! `rides` stream and watches the append-only `messages` collection.
//!
//! # Exactly-once reporting
//!
//! The cache entry for a ride is replaced unconditionally after every
//! observation, including the no-op branch. Skipping the replacement on
//! no-ops would let a later status flip be double-reported or missed.
//!
//! # Lifecycle
//!
//! Start/stop is idempotent: starting a running detector is a no-op, and
//! stopping releases the subscriptions and drops the diff cache, so a
//! subsequent start re-baselines from a fresh snapshot instead of producing
//! stale-cache false positives.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use ridepool_core::environment::Clock;
use ridepool_core::event::RideEvent;
use ridepool_core::message::Message;
use ridepool_core::ride::{Request, Ride, RideId};
use ridepool_core::store::{ChangeStream, CollectionChange, DocumentStore, StoreError, collections};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Last-observed request list per ride.
///
/// Owned and injectable: every detector (and every test) gets its own cache,
/// never a shared global.
#[derive(Debug, Default)]
pub struct DiffCache {
    entries: HashMap<RideId, Vec<Request>>,
}

impl DiffCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rides with a baseline.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no baseline has been established yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Diff one observed ride against its cached request list.
    ///
    /// The first observation of a ride establishes its baseline and emits
    /// nothing. The cache entry is replaced unconditionally.
    #[must_use]
    pub fn observe(&mut self, ride: &Ride) -> Vec<RideEvent> {
        let Some(previous) = self
            .entries
            .insert(ride.id.clone(), ride.requests.clone())
        else {
            return vec![];
        };

        let mut events = vec![];
        for request in &ride.requests {
            match previous.iter().find(|p| p.user_id == request.user_id) {
                None => events.push(RideEvent::RequestCreated {
                    ride: ride.clone(),
                    request: request.clone(),
                }),
                Some(prev) if prev.status != request.status => {
                    events.push(RideEvent::RequestStatusChanged {
                        ride: ride.clone(),
                        request: request.clone(),
                        old_status: prev.status,
                        new_status: request.status,
                    });
                }
                Some(_) => {}
            }
        }
        events
    }

    /// Drop the cache entry for a vanished ride.
    ///
    /// Returns [`RideEvent::RideRemoved`] when the ride had a baseline.
    pub fn remove(&mut self, ride_id: &RideId) -> Option<RideEvent> {
        self.entries.remove(ride_id).map(|_| RideEvent::RideRemoved {
            ride_id: ride_id.clone(),
        })
    }

    /// Forget every baseline.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Long-running loop turning store change streams into [`RideEvent`]s.
pub struct ChangeDetector {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    events: mpsc::Sender<RideEvent>,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl ChangeDetector {
    /// Create a detector that publishes events to the given channel.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        events: mpsc::Sender<RideEvent>,
    ) -> Self {
        Self {
            store,
            clock,
            events,
            shutdown: None,
            handle: None,
        }
    }

    /// Whether the detector loop is currently running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Subscribe to the store and spawn the processing loop.
    ///
    /// Starting a running detector is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a subscription cannot be established.
    pub async fn start(&mut self) -> Result<(), StoreError> {
        if self.handle.is_some() {
            tracing::debug!("change detector already running");
            return Ok(());
        }

        let rides = self.store.watch(collections::RIDES).await?;
        let messages = self.store.watch(collections::MESSAGES).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = DetectorWorker {
            store: Arc::clone(&self.store),
            rides,
            messages,
            // Fresh cache per start: a restart re-baselines cleanly.
            cache: DiffCache::new(),
            started_at: self.clock.now(),
            events: self.events.clone(),
            shutdown: shutdown_rx,
        };

        self.shutdown = Some(shutdown_tx);
        self.handle = Some(tokio::spawn(worker.run()));
        tracing::info!("change detector started");
        Ok(())
    }

    /// Signal the loop to stop and wait for it to finish.
    ///
    /// Stopping an already-stopped detector is a no-op. The cache lives
    /// inside the loop task, so it is dropped with it.
    pub async fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            tracing::debug!("change detector already stopped");
            return;
        };
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        match tokio::time::timeout(STOP_TIMEOUT, handle).await {
            Ok(Ok(())) => tracing::info!("change detector stopped"),
            Ok(Err(e)) => tracing::warn!(error = %e, "change detector task failed"),
            Err(_) => tracing::warn!("change detector shutdown timed out"),
        }
    }
}

struct DetectorWorker {
    store: Arc<dyn DocumentStore>,
    rides: ChangeStream,
    messages: ChangeStream,
    cache: DiffCache,
    started_at: DateTime<Utc>,
    events: mpsc::Sender<RideEvent>,
    shutdown: watch::Receiver<bool>,
}

impl DetectorWorker {
    #[allow(clippy::cognitive_complexity)]
    async fn run(mut self) {
        loop {
            tokio::select! {
                change = self.rides.next() => match change {
                    Some(Ok(change)) => self.on_ride_change(change).await,
                    Some(Err(e)) => tracing::error!(error = %e, "ride stream error"),
                    None => {
                        tracing::info!("ride stream closed, detector exiting");
                        break;
                    }
                },
                change = self.messages.next() => match change {
                    Some(Ok(change)) => self.on_message_change(change).await,
                    Some(Err(e)) => tracing::error!(error = %e, "message stream error"),
                    None => {
                        tracing::info!("message stream closed, detector exiting");
                        break;
                    }
                },
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        tracing::info!("shutdown signal received");
                        break;
                    }
                }
            }
        }
    }

    async fn on_ride_change(&mut self, change: CollectionChange) {
        match change {
            CollectionChange::Added { id, doc } | CollectionChange::Modified { id, doc } => {
                let Some(mut ride) = parse_ride(&id, doc) else {
                    return;
                };
                // The document key is authoritative; a just-created ride may
                // not carry its assigned id in the body yet.
                ride.id = RideId::from(id);
                for event in self.cache.observe(&ride) {
                    self.emit(event).await;
                }
            }
            CollectionChange::Removed { id } => {
                if let Some(event) = self.cache.remove(&RideId::from(id)) {
                    self.emit(event).await;
                }
            }
        }
    }

    async fn on_message_change(&mut self, change: CollectionChange) {
        // Messages are append-only; only additions carry information.
        let CollectionChange::Added { id, doc } = change else {
            return;
        };
        let message: Message = match serde_json::from_value(doc) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(message_id = %id, error = %e, "skipping malformed message");
                return;
            }
        };
        if message.sender_id.is_system() {
            return;
        }
        if message.created_at <= self.started_at {
            // History replayed by the initial snapshot, not a new message.
            return;
        }

        let ride = match self
            .store
            .get(collections::RIDES, message.ride_id.as_str())
            .await
        {
            Ok(Some(versioned)) => match parse_ride(message.ride_id.as_str(), versioned.doc) {
                Some(ride) => ride,
                None => return,
            },
            Ok(None) => {
                tracing::debug!(ride_id = %message.ride_id, "message for a vanished ride");
                return;
            }
            Err(e) => {
                tracing::error!(ride_id = %message.ride_id, error = %e, "ride lookup failed");
                return;
            }
        };

        self.emit(RideEvent::MessagePosted { ride, message }).await;
    }

    async fn emit(&mut self, event: RideEvent) {
        tracing::debug!(event = event.kind(), "change detected");
        if self.events.send(event).await.is_err() {
            tracing::warn!("event channel closed, dropping event");
        }
    }
}

fn parse_ride(id: &str, doc: Value) -> Option<Ride> {
    match serde_json::from_value::<Ride>(doc) {
        Ok(ride) => Some(ride),
        Err(e) => {
            tracing::warn!(ride_id = %id, error = %e, "skipping malformed ride document");
            None
        }
    }
}
