//! Races on the seat-booking protocol.

#![allow(clippy::unwrap_used, clippy::panic)]

use chrono::TimeDelta;
use ridepool_core::environment::Clock;
use ridepool_core::error::LedgerError;
use ridepool_core::identity::Caller;
use ridepool_core::ride::UserId;
use ridepool_core::store::DocumentStore;
use ridepool_engine::broadcast::BroadcastChannel;
use ridepool_engine::config::Config;
use ridepool_engine::ledger::RideLedger;
use ridepool_testing::{MemoryStore, RideBuilder, seed_ride, test_clock};
use std::sync::Arc;

fn setup(config: &Config) -> (MemoryStore, Arc<RideLedger>) {
    let store = MemoryStore::new();
    let store_dyn: Arc<dyn DocumentStore> = Arc::new(store.clone());
    let clock: Arc<dyn Clock> = Arc::new(test_clock());
    let broadcasts = BroadcastChannel::new(
        Arc::clone(&store_dyn),
        Arc::clone(&clock),
        TimeDelta::seconds(30),
    );
    let ledger = Arc::new(RideLedger::new(store_dyn, clock, broadcasts, config));
    (store, ledger)
}

#[tokio::test]
async fn concurrent_accepts_on_the_last_seat_admit_exactly_one() {
    // Generous retry budget so no task fails on contention alone.
    let config = Config {
        cas_retries: 64,
        ..Config::default()
    };
    let (store, ledger) = setup(&config);

    let requesters: Vec<UserId> = (0..8).map(|i| UserId::new(200_001 + i)).collect();
    let mut builder = RideBuilder::new("race").seats_total(1);
    for user in &requesters {
        builder = builder.pending_request(*user, format!("user-{user}"));
    }
    let ride = builder.build();
    seed_ride(&store, &ride).await.unwrap();

    let author = Caller::new(UserId::new(100_001), "Alice");
    let handles: Vec<_> = requesters
        .iter()
        .map(|user| {
            let ledger = Arc::clone(&ledger);
            let author = author.clone();
            let ride_id = ride.id.clone();
            let user = *user;
            tokio::spawn(async move { ledger.accept_request(&ride_id, &author, user).await })
        })
        .collect();

    let mut approved = 0;
    let mut no_seats = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => approved += 1,
            Err(LedgerError::NoSeats) => no_seats += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(approved, 1);
    assert_eq!(no_seats, 7);

    let final_ride = ledger.ride(&ride.id).await.unwrap();
    assert_eq!(final_ride.seats_taken, 1);
    assert!(final_ride.seat_invariant_holds());
}

#[tokio::test]
async fn concurrent_joins_never_break_the_seat_invariant() {
    let config = Config {
        cas_retries: 64,
        ..Config::default()
    };
    let (store, ledger) = setup(&config);
    let ride = RideBuilder::new("busy").seats_total(3).build();
    seed_ride(&store, &ride).await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            let ride_id = ride.id.clone();
            let caller = Caller::new(UserId::new(400_001 + i), format!("user-{i}"));
            tokio::spawn(async move { ledger.join_ride(&ride_id, &caller).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let final_ride = ledger.ride(&ride.id).await.unwrap();
    assert_eq!(final_ride.requests.len(), 16);
    assert_eq!(final_ride.seats_taken, 0);
    assert!(final_ride.seat_invariant_holds());
}
