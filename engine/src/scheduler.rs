//! Departure reminders.
//!
//! A periodic scan over all rides that fires a reminder at most once per
//! ride, 15 minutes before its departure time. Idempotence rests on the
//! persisted `reminded` flag, not on scheduler memory: a second tick in the
//! same matching minute sees the flag and skips, and a missed tick in the
//! matching minute means the reminder is silently skipped rather than sent
//! late. Matching is minute-exact against the stored departure time; a
//! known precision limitation for non-minute-aligned clocks.

use chrono::TimeDelta;
use ridepool_core::environment::Clock;
use ridepool_core::event::RideEvent;
use ridepool_core::ride::DepartureTime;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::ledger::RideLedger;

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Periodic reminder scan over the ride collection.
pub struct ReminderScheduler {
    ledger: Arc<RideLedger>,
    clock: Arc<dyn Clock>,
    events: mpsc::Sender<RideEvent>,
    period: Duration,
    lead: TimeDelta,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl ReminderScheduler {
    /// Create a scheduler ticking every `period`, reminding `lead` before
    /// departure.
    #[must_use]
    pub fn new(
        ledger: Arc<RideLedger>,
        clock: Arc<dyn Clock>,
        events: mpsc::Sender<RideEvent>,
        period: Duration,
        lead: TimeDelta,
    ) -> Self {
        Self {
            ledger,
            clock,
            events,
            period,
            lead,
            shutdown: None,
            handle: None,
        }
    }

    /// Whether the scan loop is currently running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the periodic scan. Starting a running scheduler is a no-op.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            tracing::debug!("reminder scheduler already running");
            return;
        }
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let ledger = Arc::clone(&self.ledger);
        let clock = Arc::clone(&self.clock);
        let events = self.events.clone();
        let period = self.period;
        let lead = self.lead;

        self.shutdown = Some(shutdown_tx);
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        scan(&ledger, clock.as_ref(), &events, lead).await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("shutdown signal received");
                            break;
                        }
                    }
                }
            }
        }));
        tracing::info!(period_secs = period.as_secs(), "reminder scheduler started");
    }

    /// Signal the loop to stop and wait for it to finish.
    ///
    /// Stopping an already-stopped scheduler is a no-op.
    pub async fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            tracing::debug!("reminder scheduler already stopped");
            return;
        };
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        match tokio::time::timeout(STOP_TIMEOUT, handle).await {
            Ok(Ok(())) => tracing::info!("reminder scheduler stopped"),
            Ok(Err(e)) => tracing::warn!(error = %e, "reminder scheduler task failed"),
            Err(_) => tracing::warn!("reminder scheduler shutdown timed out"),
        }
    }

    /// Run one scan immediately, outside the periodic loop.
    ///
    /// Exposed so callers with a controllable clock can drive the scan
    /// deterministically.
    pub async fn tick(&self) {
        scan(&self.ledger, self.clock.as_ref(), &self.events, self.lead).await;
    }
}

/// One pass over all rides: emit a reminder for every ride departing in
/// exactly `lead` (minute precision), then persist the `reminded` flag.
///
/// A failure on one ride is logged and does not stop the scan.
async fn scan(
    ledger: &RideLedger,
    clock: &dyn Clock,
    events: &mpsc::Sender<RideEvent>,
    lead: TimeDelta,
) {
    let now = clock.now();
    let target_time = DepartureTime::from_datetime(now + lead);
    let today = now.date_naive();

    let rides = match ledger.rides().await {
        Ok(rides) => rides,
        Err(e) => {
            tracing::error!(error = %e, "reminder scan failed to list rides");
            return;
        }
    };

    for ride in rides {
        if ride.reminded || ride.date != today || ride.time != target_time {
            continue;
        }
        tracing::info!(ride_id = %ride.id, time = %ride.time, "departure reminder due");

        let ride_id = ride.id.clone();
        if events
            .send(RideEvent::DepartureReminder { ride })
            .await
            .is_err()
        {
            tracing::warn!("event channel closed, dropping reminder");
            continue;
        }
        // Flag set in the same logical step as the emit; a failure here is
        // logged and the next tick may re-remind.
        if let Err(e) = ledger.mark_reminded(&ride_id).await {
            tracing::warn!(ride_id = %ride_id, error = %e, "failed to mark ride reminded");
        }
    }
}
