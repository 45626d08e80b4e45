//! End-to-end ledger behavior against the in-memory store.

#![allow(clippy::unwrap_used)]

use chrono::{NaiveDate, TimeDelta};
use ridepool_core::environment::Clock;
use ridepool_core::error::LedgerError;
use ridepool_core::identity::Caller;
use ridepool_core::ride::{
    DepartureTime, Direction, RequestStatus, Ride, RideDetails, RideUpdate, UserId,
};
use ridepool_core::store::{DocumentStore, collections};
use ridepool_engine::broadcast::BroadcastChannel;
use ridepool_engine::config::Config;
use ridepool_engine::ledger::RideLedger;
use ridepool_testing::{MemoryStore, RideBuilder, seed_ride, test_clock};
use std::sync::Arc;
use tokio_test::assert_ok;

fn alice() -> Caller {
    Caller::new(UserId::new(100_001), "Alice")
}

fn bob() -> Caller {
    Caller::new(UserId::new(200_001), "Bob")
}

fn carol() -> Caller {
    Caller::new(UserId::new(200_002), "Carol")
}

fn details(destination: &str) -> RideDetails {
    RideDetails {
        direction: Direction::ToCity,
        date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        time: DepartureTime::new(12, 0).unwrap(),
        destination: destination.to_string(),
        is_driver: true,
        seats_total: 3,
        price: Some(20),
        comment: String::new(),
    }
}

fn setup() -> (MemoryStore, RideLedger) {
    setup_with(Config::default())
}

fn setup_with(config: Config) -> (MemoryStore, RideLedger) {
    let store = MemoryStore::new();
    let store_dyn: Arc<dyn DocumentStore> = Arc::new(store.clone());
    let clock: Arc<dyn Clock> = Arc::new(test_clock());
    let broadcasts = BroadcastChannel::new(
        Arc::clone(&store_dyn),
        Arc::clone(&clock),
        TimeDelta::seconds(30),
    );
    let ledger = RideLedger::new(store_dyn, clock, broadcasts, &config);
    (store, ledger)
}

#[tokio::test]
async fn booking_walkthrough() {
    let (_, ledger) = setup();

    // Alice offers a ride with two seats.
    let mut d = details("Airport");
    d.seats_total = 2;
    let ride = assert_ok!(ledger.create_ride(&alice(), d).await);
    assert!(!ride.id.as_str().is_empty());

    // Bob and Carol ask to join.
    let ride = assert_ok!(ledger.join_ride(&ride.id, &bob()).await);
    let ride = assert_ok!(ledger.join_ride(&ride.id, &carol()).await);
    assert_eq!(ride.requests.len(), 2);
    assert_eq!(ride.seats_taken, 0);

    // Alice approves both; the ride is now full.
    let ride = ledger
        .accept_request(&ride.id, &alice(), bob().id)
        .await
        .unwrap();
    let ride = ledger
        .accept_request(&ride.id, &alice(), carol().id)
        .await
        .unwrap();
    assert_eq!(ride.seats_taken, 2);
    assert!(ride.is_full());
    assert!(ride.seat_invariant_holds());

    // Carol withdraws; her seat is released and her entry removed.
    let ride = ledger.cancel_request(&ride.id, &carol()).await.unwrap();
    assert_eq!(ride.seats_taken, 1);
    assert!(ride.request(carol().id).is_none());
    assert!(ride.seat_invariant_holds());

    // She can join again from scratch.
    let ride = ledger.join_ride(&ride.id, &carol()).await.unwrap();
    assert_eq!(ride.request(carol().id).unwrap().status, RequestStatus::Pending);
}

#[tokio::test]
async fn duplicate_join_is_rejected_whatever_the_status() {
    let (_, ledger) = setup();
    let ride = ledger.create_ride(&alice(), details("Airport")).await.unwrap();

    ledger.join_ride(&ride.id, &bob()).await.unwrap();
    let err = ledger.join_ride(&ride.id, &bob()).await.unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyRequested(id) if id == bob().id));

    // Still blocked after rejection; only a cancel clears the entry.
    ledger
        .reject_request(&ride.id, &alice(), bob().id)
        .await
        .unwrap();
    let err = ledger.join_ride(&ride.id, &bob()).await.unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyRequested(_)));
}

#[tokio::test]
async fn join_fails_when_no_seats_remain() {
    let (store, ledger) = setup();
    let ride = RideBuilder::new("full")
        .seats_total(1)
        .approved_request(UserId::new(300_001), "Dave")
        .build();
    seed_ride(&store, &ride).await.unwrap();

    let err = ledger.join_ride(&ride.id, &bob()).await.unwrap_err();
    assert!(matches!(err, LedgerError::NoSeats));
}

#[tokio::test]
async fn accept_on_full_ride_fails_and_is_a_noop_when_already_approved() {
    let (store, ledger) = setup();
    let ride = RideBuilder::new("full")
        .seats_total(1)
        .approved_request(bob().id, "Bob")
        .pending_request(carol().id, "Carol")
        .build();
    seed_ride(&store, &ride).await.unwrap();

    let err = ledger
        .accept_request(&ride.id, &alice(), carol().id)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NoSeats));

    // Re-accepting Bob changes nothing.
    let ride = ledger
        .accept_request(&ride.id, &alice(), bob().id)
        .await
        .unwrap();
    assert_eq!(ride.seats_taken, 1);
}

#[tokio::test]
async fn rejecting_an_approved_passenger_releases_the_seat() {
    let (store, ledger) = setup();
    let ride = RideBuilder::new("r1")
        .approved_request(bob().id, "Bob")
        .build();
    seed_ride(&store, &ride).await.unwrap();

    let ride = ledger
        .reject_request(&ride.id, &alice(), bob().id)
        .await
        .unwrap();
    assert_eq!(ride.seats_taken, 0);
    assert_eq!(ride.request(bob().id).unwrap().status, RequestStatus::Rejected);
    assert!(ride.seat_invariant_holds());

    // Rejecting a user with no request is a no-op.
    let ride = ledger
        .reject_request(&ride.id, &alice(), UserId::new(999_999))
        .await
        .unwrap();
    assert_eq!(ride.requests.len(), 1);
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let (store, ledger) = setup();
    let ride = RideBuilder::new("r1")
        .approved_request(bob().id, "Bob")
        .build();
    seed_ride(&store, &ride).await.unwrap();

    let first = ledger.cancel_request(&ride.id, &bob()).await.unwrap();
    assert_eq!(first.seats_taken, 0);
    let second = ledger.cancel_request(&ride.id, &bob()).await.unwrap();
    assert_eq!(second, first);
}

#[tokio::test]
async fn frozen_ride_refuses_joins_but_allows_cancel() {
    let (store, ledger) = setup();
    // Clock is at 08:00; a 07:00 departure is frozen.
    let ride = RideBuilder::new("gone")
        .time(DepartureTime::new(7, 0).unwrap())
        .approved_request(bob().id, "Bob")
        .build();
    seed_ride(&store, &ride).await.unwrap();

    let err = ledger.join_ride(&ride.id, &carol()).await.unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let ride = ledger.cancel_request(&ride.id, &bob()).await.unwrap();
    assert_eq!(ride.seats_taken, 0);
}

#[tokio::test]
async fn create_validates_destination_and_seats() {
    let (_, ledger) = setup();

    let mut blank = details("   ");
    blank.seats_total = 3;
    assert!(matches!(
        ledger.create_ride(&alice(), blank).await.unwrap_err(),
        LedgerError::Validation(_)
    ));

    let mut too_many = details("Airport");
    too_many.seats_total = 5;
    assert!(matches!(
        ledger.create_ride(&alice(), too_many).await.unwrap_err(),
        LedgerError::Validation(_)
    ));

    // Taxi rides cap at three seats.
    let mut taxi = details("Airport");
    taxi.is_driver = false;
    taxi.seats_total = 4;
    assert!(matches!(
        ledger.create_ride(&alice(), taxi).await.unwrap_err(),
        LedgerError::Validation(_)
    ));
}

#[tokio::test]
async fn quota_counts_only_visible_rides() {
    let (store, ledger) = setup_with(Config {
        active_ride_limit: 2,
        ..Config::default()
    });

    // One ride long past its grace window does not count.
    let stale = RideBuilder::new("stale")
        .time(DepartureTime::new(6, 0).unwrap())
        .build();
    seed_ride(&store, &stale).await.unwrap();

    ledger.create_ride(&alice(), details("Airport")).await.unwrap();
    ledger.create_ride(&alice(), details("Station")).await.unwrap();

    let err = ledger
        .create_ride(&alice(), details("Harbor"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::QuotaExceeded { active: 2, limit: 2 }
    ));

    // Other authors are unaffected.
    ledger.create_ride(&bob(), details("Harbor")).await.unwrap();
}

#[tokio::test]
async fn only_the_author_accepts_and_rejects() {
    let (store, ledger) = setup();
    let ride = RideBuilder::new("r1")
        .pending_request(bob().id, "Bob")
        .build();
    seed_ride(&store, &ride).await.unwrap();

    assert!(matches!(
        ledger
            .accept_request(&ride.id, &carol(), bob().id)
            .await
            .unwrap_err(),
        LedgerError::Unauthorized
    ));
    assert!(matches!(
        ledger
            .reject_request(&ride.id, &carol(), bob().id)
            .await
            .unwrap_err(),
        LedgerError::Unauthorized
    ));
}

#[tokio::test]
async fn update_is_author_only_and_announces_in_chat() {
    let (store, ledger) = setup();
    let ride = RideBuilder::new("r1").build();
    seed_ride(&store, &ride).await.unwrap();

    assert!(matches!(
        ledger
            .update_ride(&ride.id, &alice(), RideUpdate::default())
            .await
            .unwrap_err(),
        LedgerError::Validation(_)
    ));
    assert!(matches!(
        ledger
            .update_ride(
                &ride.id,
                &bob(),
                RideUpdate {
                    destination: Some("Harbor".to_string()),
                    ..RideUpdate::default()
                }
            )
            .await
            .unwrap_err(),
        LedgerError::Unauthorized
    ));

    let updated = ledger
        .update_ride(
            &ride.id,
            &alice(),
            RideUpdate {
                time: Some(DepartureTime::new(13, 30).unwrap()),
                destination: Some("Harbor".to_string()),
                price: Some(None),
                ..RideUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.destination, "Harbor");
    assert_eq!(updated.price, None);

    // A system message announcing the change landed in the chat.
    let messages = store.list(collections::MESSAGES).await.unwrap();
    assert_eq!(messages.len(), 1);
    let (_, doc) = &messages[0];
    assert_eq!(doc["senderId"], "system");
    assert!(doc["text"].as_str().unwrap().contains("Harbor"));
}

#[tokio::test]
async fn delete_requires_author_or_moderator() {
    let moderator = Caller::new(UserId::new(900_001), "Mod");
    let (store, ledger) = setup_with(Config {
        moderators: [moderator.id].into_iter().collect(),
        ..Config::default()
    });

    let mine = RideBuilder::new("mine").build();
    let other = RideBuilder::new("other").build();
    seed_ride(&store, &mine).await.unwrap();
    seed_ride(&store, &other).await.unwrap();

    assert!(matches!(
        ledger.delete_ride(&mine.id, &bob()).await.unwrap_err(),
        LedgerError::Unauthorized
    ));
    ledger.delete_ride(&mine.id, &alice()).await.unwrap();
    ledger.delete_ride(&other.id, &moderator).await.unwrap();

    assert!(matches!(
        ledger.ride(&mine.id).await.unwrap_err(),
        LedgerError::NotFound(_)
    ));
}

#[tokio::test]
async fn banned_users_cannot_create_or_join() {
    let moderator = Caller::new(UserId::new(900_001), "Mod");
    let (store, ledger) = setup_with(Config {
        moderators: [moderator.id].into_iter().collect(),
        ..Config::default()
    });
    let ride = RideBuilder::new("r1").build();
    seed_ride(&store, &ride).await.unwrap();

    // Only moderators ban.
    assert!(matches!(
        ledger.ban_user(&alice(), bob().id, "Bob").await.unwrap_err(),
        LedgerError::Unauthorized
    ));

    ledger.ban_user(&moderator, bob().id, "Bob").await.unwrap();
    assert!(ledger.is_banned(bob().id).await.unwrap());

    assert!(matches!(
        ledger.join_ride(&ride.id, &bob()).await.unwrap_err(),
        LedgerError::Unauthorized
    ));
    assert!(matches!(
        ledger.create_ride(&bob(), details("Airport")).await.unwrap_err(),
        LedgerError::Unauthorized
    ));

    ledger.unban_user(&moderator, bob().id).await.unwrap();
    assert!(!ledger.is_banned(bob().id).await.unwrap());
    ledger.join_ride(&ride.id, &bob()).await.unwrap();
}

#[tokio::test]
async fn visible_rides_are_filtered_and_ordered_by_departure() {
    let (store, ledger) = setup();

    // 07:00 is past the 10-minute grace window at 08:00; 07:55 is frozen but
    // still inside it.
    for (id, time) in [("late", (14, 0)), ("early", (9, 0)), ("past", (7, 0)), ("grace", (7, 55))] {
        let ride = RideBuilder::new(id)
            .time(DepartureTime::new(time.0, time.1).unwrap())
            .build();
        seed_ride(&store, &ride).await.unwrap();
    }

    let visible: Vec<String> = ledger
        .visible_rides()
        .await
        .unwrap()
        .into_iter()
        .map(|r: Ride| r.id.as_str().to_string())
        .collect();
    assert_eq!(visible, vec!["grace", "early", "late"]);
}

#[tokio::test]
async fn grace_window_is_configurable() {
    let (store, ledger) = setup_with(Config {
        visibility_grace_minutes: 120,
        active_ride_limit: 1,
        ..Config::default()
    });

    // Departed at 07:00, one hour before the clock; the default window would
    // have dropped it, two hours keep it listed and counted.
    let departed = RideBuilder::new("departed")
        .time(DepartureTime::new(7, 0).unwrap())
        .build();
    seed_ride(&store, &departed).await.unwrap();

    let visible = ledger.visible_rides().await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id.as_str(), "departed");

    // It still occupies the author's quota.
    assert!(matches!(
        ledger
            .create_ride(&alice(), details("Airport"))
            .await
            .unwrap_err(),
        LedgerError::QuotaExceeded { active: 1, limit: 1 }
    ));
}

#[tokio::test]
async fn document_key_overrides_a_stale_body_id() {
    let (store, ledger) = setup();
    // A create interrupted between insert and the follow-up write leaves an
    // empty id in the body; the key is authoritative.
    let orphan = RideBuilder::new("").build();
    let doc = serde_json::to_value(&orphan).unwrap();
    store.put(collections::RIDES, "orphan", doc).await.unwrap();

    let read = ledger.ride(&"orphan".into()).await.unwrap();
    assert_eq!(read.id.as_str(), "orphan");

    let listed = ledger.rides().await.unwrap();
    assert_eq!(listed[0].id.as_str(), "orphan");

    // A mutation writes the healed id back into the body.
    let joined = ledger.join_ride(&"orphan".into(), &bob()).await.unwrap();
    assert_eq!(joined.id.as_str(), "orphan");
    let stored = store
        .get(collections::RIDES, "orphan")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.doc["id"], "orphan");
}

#[tokio::test]
async fn operations_on_a_missing_ride_report_not_found() {
    let (_, ledger) = setup();
    let missing = "nope".into();
    assert!(matches!(
        ledger.join_ride(&missing, &bob()).await.unwrap_err(),
        LedgerError::NotFound(_)
    ));
    assert!(matches!(
        ledger.ride(&missing).await.unwrap_err(),
        LedgerError::NotFound(_)
    ));
}
