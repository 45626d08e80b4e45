//! Fixture builders for ride documents.

use chrono::{DateTime, NaiveDate, Utc};
use ridepool_core::ride::{
    DepartureTime, Direction, Request, RequestStatus, Ride, RideId, RideStatus, UserId,
};
use ridepool_core::store::{DocumentStore, StoreError, collections};

use crate::MemoryStore;

/// Builder for [`Ride`] fixtures with sensible defaults.
///
/// Defaults: driver-offered ride to "Airport" on 2025-06-01 at 12:00 with 3
/// seats, authored by user 100001 ("Alice"), no requests.
///
/// # Example
///
/// ```
/// use ridepool_testing::RideBuilder;
/// use ridepool_core::ride::UserId;
///
/// let ride = RideBuilder::new("r1")
///     .seats_total(2)
///     .pending_request(UserId::new(200_001), "Bob")
///     .build();
/// assert_eq!(ride.requests.len(), 1);
/// assert!(ride.seat_invariant_holds());
/// ```
#[derive(Clone, Debug)]
pub struct RideBuilder {
    ride: Ride,
}

impl RideBuilder {
    /// Start from the default fixture with the given id.
    ///
    /// # Panics
    ///
    /// Never panics; the default date and time are compile-time valid.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn new(id: impl Into<String>) -> Self {
        #[allow(clippy::unwrap_used)]
        let ride = Ride {
            id: RideId::new(id),
            author_id: UserId::new(100_001),
            author: "Alice".to_string(),
            telegram: None,
            direction: Direction::ToCity,
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            time: DepartureTime::new(12, 0).unwrap(),
            destination: "Airport".to_string(),
            is_driver: true,
            seats_total: 3,
            seats_taken: 0,
            requests: vec![],
            price: Some(20),
            comment: String::new(),
            status: RideStatus::Active,
            reminded: false,
            created_at: DateTime::<Utc>::MIN_UTC,
        };
        Self { ride }
    }

    /// Set the author.
    #[must_use]
    pub fn author(mut self, id: UserId, name: impl Into<String>) -> Self {
        self.ride.author_id = id;
        self.ride.author = name.into();
        self
    }

    /// Set the departure date.
    #[must_use]
    pub const fn date(mut self, date: NaiveDate) -> Self {
        self.ride.date = date;
        self
    }

    /// Set the departure time.
    #[must_use]
    pub const fn time(mut self, time: DepartureTime) -> Self {
        self.ride.time = time;
        self
    }

    /// Set the destination.
    #[must_use]
    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.ride.destination = destination.into();
        self
    }

    /// Set the seat capacity.
    #[must_use]
    pub const fn seats_total(mut self, seats: u8) -> Self {
        self.ride.seats_total = seats;
        self
    }

    /// Mark the reminder as already sent.
    #[must_use]
    pub const fn reminded(mut self) -> Self {
        self.ride.reminded = true;
        self
    }

    /// Append a pending request.
    #[must_use]
    pub fn pending_request(mut self, user_id: UserId, name: impl Into<String>) -> Self {
        self.ride.requests.push(Request {
            user_id,
            name: name.into(),
            telegram: None,
            status: RequestStatus::Pending,
        });
        self
    }

    /// Append an approved request and take its seat.
    #[must_use]
    pub fn approved_request(mut self, user_id: UserId, name: impl Into<String>) -> Self {
        self.ride.requests.push(Request {
            user_id,
            name: name.into(),
            telegram: None,
            status: RequestStatus::Approved,
        });
        self.ride.seats_taken += 1;
        self
    }

    /// Finish the fixture.
    #[must_use]
    pub fn build(self) -> Ride {
        self.ride
    }
}

/// Write a ride document straight into the store, bypassing the ledger.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if the ride cannot be serialized.
pub async fn seed_ride(store: &MemoryStore, ride: &Ride) -> Result<(), StoreError> {
    let doc = serde_json::to_value(ride).map_err(|e| StoreError::Serialization(e.to_string()))?;
    store.put(collections::RIDES, ride.id.as_str(), doc).await
}
