//! Reminder scheduling driven by a manual clock.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::TimeDelta;
use ridepool_core::environment::Clock;
use ridepool_core::event::RideEvent;
use ridepool_core::ride::DepartureTime;
use ridepool_core::store::{DocumentStore, collections};
use ridepool_engine::broadcast::BroadcastChannel;
use ridepool_engine::config::Config;
use ridepool_engine::ledger::RideLedger;
use ridepool_engine::scheduler::ReminderScheduler;
use ridepool_testing::{ManualClock, MemoryStore, RideBuilder, seed_ride, test_clock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Fixture {
    store: MemoryStore,
    clock: ManualClock,
    scheduler: ReminderScheduler,
    events: mpsc::Receiver<RideEvent>,
}

fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let store_dyn: Arc<dyn DocumentStore> = Arc::new(store.clone());
    let clock = ManualClock::new(test_clock().now());
    let clock_dyn: Arc<dyn Clock> = Arc::new(clock.clone());
    let broadcasts = BroadcastChannel::new(
        Arc::clone(&store_dyn),
        Arc::clone(&clock_dyn),
        TimeDelta::seconds(30),
    );
    let ledger = Arc::new(RideLedger::new(
        store_dyn,
        Arc::clone(&clock_dyn),
        broadcasts,
        &Config::default(),
    ));
    let (tx, events) = mpsc::channel(64);
    let scheduler = ReminderScheduler::new(
        ledger,
        clock_dyn,
        tx,
        Duration::from_secs(60),
        TimeDelta::minutes(15),
    );
    Fixture {
        store,
        clock,
        scheduler,
        events,
    }
}

#[tokio::test]
async fn a_ride_is_reminded_exactly_once() {
    let mut fx = fixture();
    // Clock at 08:00; departure at 08:15 is exactly one lead away.
    let ride = RideBuilder::new("soon")
        .time(DepartureTime::new(8, 15).unwrap())
        .build();
    seed_ride(&fx.store, &ride).await.unwrap();

    fx.scheduler.tick().await;
    match fx.events.try_recv().expect("reminder expected") {
        RideEvent::DepartureReminder { ride: reminded } => assert_eq!(reminded.id, ride.id),
        other => panic!("unexpected event: {}", other.kind()),
    }

    // The flag was persisted.
    let doc = fx
        .store
        .get(collections::RIDES, "soon")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.doc["reminded"], true);

    // A second tick in the same minute sees the flag and stays silent.
    fx.scheduler.tick().await;
    assert!(fx.events.try_recv().is_err());
}

#[tokio::test]
async fn only_the_exact_minute_matches() {
    let mut fx = fixture();
    for (id, time) in [
        ("later", (9, 0)),
        ("sixteen", (8, 16)),
        ("fourteen", (8, 14)),
        ("match", (8, 15)),
    ] {
        let ride = RideBuilder::new(id)
            .time(DepartureTime::new(time.0, time.1).unwrap())
            .build();
        seed_ride(&fx.store, &ride).await.unwrap();
    }

    fx.scheduler.tick().await;
    match fx.events.try_recv().expect("reminder expected") {
        RideEvent::DepartureReminder { ride } => assert_eq!(ride.id.as_str(), "match"),
        other => panic!("unexpected event: {}", other.kind()),
    }
    assert!(fx.events.try_recv().is_err());
}

#[tokio::test]
async fn rides_on_another_date_are_ignored() {
    let mut fx = fixture();
    let tomorrow = RideBuilder::new("tomorrow")
        .date(chrono::NaiveDate::from_ymd_opt(2025, 6, 2).unwrap())
        .time(DepartureTime::new(8, 15).unwrap())
        .build();
    seed_ride(&fx.store, &tomorrow).await.unwrap();

    fx.scheduler.tick().await;
    assert!(fx.events.try_recv().is_err());
}

#[tokio::test]
async fn preflagged_rides_are_skipped_and_the_window_moves_with_the_clock() {
    let mut fx = fixture();
    let flagged = RideBuilder::new("flagged")
        .time(DepartureTime::new(8, 15).unwrap())
        .reminded()
        .build();
    let later = RideBuilder::new("later")
        .time(DepartureTime::new(9, 0).unwrap())
        .build();
    seed_ride(&fx.store, &flagged).await.unwrap();
    seed_ride(&fx.store, &later).await.unwrap();

    fx.scheduler.tick().await;
    assert!(fx.events.try_recv().is_err());

    // Advance to 08:45; the 09:00 departure now matches.
    fx.clock.advance(TimeDelta::minutes(45));
    fx.scheduler.tick().await;
    match fx.events.try_recv().expect("reminder expected") {
        RideEvent::DepartureReminder { ride } => assert_eq!(ride.id.as_str(), "later"),
        other => panic!("unexpected event: {}", other.kind()),
    }
}

#[tokio::test]
async fn a_malformed_document_does_not_stop_the_scan() {
    let mut fx = fixture();
    fx.store
        .put(
            collections::RIDES,
            "junk",
            serde_json::json!({"this": "is not a ride"}),
        )
        .await
        .unwrap();
    let ride = RideBuilder::new("soon")
        .time(DepartureTime::new(8, 15).unwrap())
        .build();
    seed_ride(&fx.store, &ride).await.unwrap();

    fx.scheduler.tick().await;
    assert!(matches!(
        fx.events.try_recv(),
        Ok(RideEvent::DepartureReminder { .. })
    ));
}
