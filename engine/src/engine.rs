//! Engine assembly and lifecycle.
//!
//! Wires the ledger, change detector, reminder scheduler, broadcast channel
//! and notification dispatcher over one store, one transport and one clock.
//! Events flow through a bounded channel: detector and scheduler send,
//! the dispatcher drains. Shutdown stops the producers first, then closes
//! the channel by dropping their senders so the dispatcher drains and exits.

use chrono::TimeDelta;
use ridepool_core::environment::Clock;
use ridepool_core::event::RideEvent;
use ridepool_core::store::{DocumentStore, StoreError};
use ridepool_core::transport::Messenger;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::broadcast::BroadcastChannel;
use crate::config::Config;
use crate::detector::ChangeDetector;
use crate::dispatcher::NotificationDispatcher;
use crate::ledger::RideLedger;
use crate::scheduler::ReminderScheduler;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The assembled coordination engine.
pub struct Engine {
    ledger: Arc<RideLedger>,
    broadcasts: BroadcastChannel,
    detector: ChangeDetector,
    scheduler: ReminderScheduler,
    dispatcher: Option<NotificationDispatcher>,
    dispatcher_handle: Option<JoinHandle<()>>,
    event_rx: Option<mpsc::Receiver<RideEvent>>,
    shutdown_timeout: Duration,
}

impl Engine {
    /// Assemble an engine over the given store, transport and clock.
    ///
    /// Nothing runs until [`start`](Self::start) is called.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        messenger: Arc<dyn Messenger>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let broadcasts = BroadcastChannel::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            TimeDelta::seconds(config.broadcast_freshness_secs),
        );
        let ledger = Arc::new(RideLedger::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            broadcasts.clone(),
            config,
        ));
        let detector = ChangeDetector::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            event_tx.clone(),
        );
        let scheduler = ReminderScheduler::new(
            Arc::clone(&ledger),
            Arc::clone(&clock),
            event_tx,
            Duration::from_secs(config.scheduler_period_secs),
            TimeDelta::minutes(config.reminder_lead_minutes),
        );
        let dispatcher = NotificationDispatcher::new(messenger);

        Self {
            ledger,
            broadcasts,
            detector,
            scheduler,
            dispatcher: Some(dispatcher),
            dispatcher_handle: None,
            event_rx: Some(event_rx),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        }
    }

    /// Handle for ride and request operations.
    #[must_use]
    pub fn ledger(&self) -> Arc<RideLedger> {
        Arc::clone(&self.ledger)
    }

    /// Handle for publishing and subscribing to global notices.
    #[must_use]
    pub fn broadcasts(&self) -> BroadcastChannel {
        self.broadcasts.clone()
    }

    /// Start the dispatcher, detector and scheduler.
    ///
    /// Starting a running engine is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the detector cannot subscribe to the
    /// store.
    pub async fn start(&mut self) -> Result<(), StoreError> {
        let (Some(dispatcher), Some(event_rx)) = (self.dispatcher.take(), self.event_rx.take())
        else {
            tracing::debug!("engine already running");
            return Ok(());
        };

        self.dispatcher_handle = Some(dispatcher.spawn(event_rx));
        self.detector.start().await?;
        self.scheduler.start();
        tracing::info!("engine started");
        Ok(())
    }

    /// Stop everything in dependency order and wait for the dispatcher to
    /// drain the event channel.
    pub async fn shutdown(mut self) {
        tracing::info!("engine shutting down");
        self.scheduler.stop().await;
        self.detector.stop().await;

        // Producers are gone; dropping them closes the channel so the
        // dispatcher drains whatever is queued and exits on its own.
        drop(self.scheduler);
        drop(self.detector);
        drop(self.event_rx);

        if let Some(handle) = self.dispatcher_handle.take() {
            match tokio::time::timeout(self.shutdown_timeout, handle).await {
                Ok(Ok(())) => tracing::info!("dispatcher drained and stopped"),
                Ok(Err(e)) => tracing::warn!(error = %e, "dispatcher task failed"),
                Err(_) => tracing::warn!("dispatcher shutdown timed out"),
            }
        }
        tracing::info!("engine stopped");
    }
}

/// Resolve when the process receives SIGINT or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received ctrl-c"),
        () = terminate => tracing::info!("received terminate signal"),
    }
}
