//! The Ride Ledger: sole writer of ride and request state.
//!
//! Every operation that mutates `seats_taken` together with `requests[]`
//! (join, accept, reject, cancel) runs as an optimistic-concurrency loop
//! against the document store: read the versioned ride, apply the mutation,
//! compare-and-swap with the read version, re-read and retry on conflict.
//! Seat counts are therefore never blind increments on a cached value, and
//! the seat invariant holds even when two authors race on the last seat.
//!
//! Create, update, delete, and ban have no cross-field invariants and go
//! through plain reads and writes.

use crate::broadcast::BroadcastChannel;
use crate::config::Config;
use chrono::{DateTime, TimeDelta, Utc};
use ridepool_core::environment::Clock;
use ridepool_core::error::LedgerError;
use ridepool_core::identity::{BanRecord, Caller};
use ridepool_core::message::{Message, Sender};
use ridepool_core::ride::{
    Request, RequestStatus, Ride, RideDetails, RideId, RideStatus, RideUpdate, UserId,
};
use ridepool_core::store::{DocumentStore, StoreError, Version, collections};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Owner of the seat-booking transaction protocol.
pub struct RideLedger {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    broadcasts: BroadcastChannel,
    moderators: HashSet<UserId>,
    active_ride_limit: usize,
    cas_retries: u32,
    visibility_grace: TimeDelta,
}

impl RideLedger {
    /// Create a ledger over the given store and clock.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        broadcasts: BroadcastChannel,
        config: &Config,
    ) -> Self {
        Self {
            store,
            clock,
            broadcasts,
            moderators: config.moderators.clone(),
            active_ride_limit: config.active_ride_limit,
            cas_retries: config.cas_retries,
            visibility_grace: TimeDelta::minutes(config.visibility_grace_minutes),
        }
    }

    /// Offer a new ride.
    ///
    /// Fails with [`LedgerError::QuotaExceeded`] once the author already has
    /// the configured number of concurrently active rides, and with
    /// [`LedgerError::Validation`] on a blank destination or an out-of-range
    /// seat count. Emits a best-effort new-ride broadcast; a broadcast
    /// failure never fails the create.
    ///
    /// # Errors
    ///
    /// See above, plus [`LedgerError::Unauthorized`] for banned callers and
    /// [`LedgerError::Store`] on store failure.
    pub async fn create_ride(
        &self,
        caller: &Caller,
        details: RideDetails,
    ) -> Result<Ride, LedgerError> {
        self.ensure_not_banned(caller.id).await?;

        if details.destination.trim().is_empty() {
            return Err(LedgerError::Validation("destination is required".into()));
        }
        if !Ride::seats_in_range(details.is_driver, details.seats_total) {
            return Err(LedgerError::Validation(format!(
                "seat count {} out of range for this ride kind",
                details.seats_total
            )));
        }

        let now = self.clock.now();
        let active = self
            .rides()
            .await?
            .into_iter()
            .filter(|r| r.author_id == caller.id && r.is_visible_within(now, self.visibility_grace))
            .count();
        if active >= self.active_ride_limit {
            return Err(LedgerError::QuotaExceeded {
                active,
                limit: self.active_ride_limit,
            });
        }

        let mut ride = Ride {
            id: RideId::new(""),
            author_id: caller.id,
            author: caller.name.clone(),
            telegram: caller.telegram.clone(),
            direction: details.direction,
            date: details.date,
            time: details.time,
            destination: details.destination,
            is_driver: details.is_driver,
            seats_total: details.seats_total,
            seats_taken: 0,
            requests: vec![],
            price: details.price,
            comment: details.comment,
            status: RideStatus::Active,
            reminded: false,
            created_at: now,
        };

        // The store assigns the id; write the document back once known.
        let id = self
            .store
            .insert(collections::RIDES, to_doc(&ride)?)
            .await?;
        ride.id = RideId::from(id);
        self.store
            .put(collections::RIDES, ride.id.as_str(), to_doc(&ride)?)
            .await?;

        tracing::info!(
            ride_id = %ride.id,
            author_id = %ride.author_id,
            destination = %ride.destination,
            "ride created"
        );

        let notice = format!(
            "New ride {} on {} at {} to {}",
            ride.direction, ride.date, ride.time, ride.destination
        );
        if let Err(e) = self.broadcasts.publish(caller.id, notice).await {
            tracing::warn!(ride_id = %ride.id, error = %e, "new-ride broadcast failed");
        }

        Ok(ride)
    }

    /// Ask to join a ride.
    ///
    /// Atomic with the duplicate and seat checks: a second join from the
    /// same user fails with [`LedgerError::AlreadyRequested`] whatever the
    /// existing request's status, and a ride full at commit time fails with
    /// [`LedgerError::NoSeats`]. Frozen rides (departure time passed) refuse
    /// new joins.
    ///
    /// # Errors
    ///
    /// See above, plus [`LedgerError::NotFound`], [`LedgerError::Unauthorized`]
    /// for banned callers, and [`LedgerError::Store`].
    pub async fn join_ride(&self, ride_id: &RideId, caller: &Caller) -> Result<Ride, LedgerError> {
        self.ensure_not_banned(caller.id).await?;
        let now = self.clock.now();
        let request = Request {
            user_id: caller.id,
            name: caller.name.clone(),
            telegram: caller.telegram.clone(),
            status: RequestStatus::Pending,
        };

        let ride = self
            .mutate_ride(ride_id, |ride| {
                if ride.is_frozen(now) {
                    return Err(LedgerError::Validation("ride has already departed".into()));
                }
                if ride.request(caller.id).is_some() {
                    return Err(LedgerError::AlreadyRequested(caller.id));
                }
                if ride.is_full() {
                    return Err(LedgerError::NoSeats);
                }
                ride.requests.push(request.clone());
                Ok(())
            })
            .await?;

        tracing::debug!(ride_id = %ride_id, user_id = %caller.id, "join request recorded");
        Ok(ride)
    }

    /// Approve a pending (or previously rejected) request, taking a seat.
    ///
    /// Author-only. Re-checks the seat count at commit time, so of N
    /// concurrent accepts on the last seat exactly one succeeds and the rest
    /// fail with [`LedgerError::NoSeats`]. Accepting an already-approved
    /// request is a no-op.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`], [`LedgerError::NotFound`],
    /// [`LedgerError::NoSeats`], [`LedgerError::Store`].
    pub async fn accept_request(
        &self,
        ride_id: &RideId,
        caller: &Caller,
        user_id: UserId,
    ) -> Result<Ride, LedgerError> {
        let caller_id = caller.id;
        let ride = self
            .mutate_ride(ride_id, |ride| {
                if ride.author_id != caller_id {
                    return Err(LedgerError::Unauthorized);
                }
                let Some(position) = ride.requests.iter().position(|r| r.user_id == user_id)
                else {
                    return Err(LedgerError::request_not_found(&ride.id, user_id));
                };
                if ride.requests[position].status == RequestStatus::Approved {
                    return Ok(());
                }
                if ride.is_full() {
                    return Err(LedgerError::NoSeats);
                }
                ride.requests[position].status = RequestStatus::Approved;
                ride.seats_taken += 1;
                Ok(())
            })
            .await?;

        tracing::debug!(
            ride_id = %ride_id,
            user_id = %user_id,
            seats_taken = ride.seats_taken,
            "request approved"
        );
        Ok(ride)
    }

    /// Deny a pending request, or exclude an already-approved passenger.
    ///
    /// Author-only. If the request was approved, the seat is released
    /// (floored at zero). A missing request is a no-op.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`], [`LedgerError::NotFound`] (ride),
    /// [`LedgerError::Store`].
    pub async fn reject_request(
        &self,
        ride_id: &RideId,
        caller: &Caller,
        user_id: UserId,
    ) -> Result<Ride, LedgerError> {
        let caller_id = caller.id;
        let ride = self
            .mutate_ride(ride_id, |ride| {
                if ride.author_id != caller_id {
                    return Err(LedgerError::Unauthorized);
                }
                let Some(position) = ride.requests.iter().position(|r| r.user_id == user_id)
                else {
                    return Ok(());
                };
                if ride.requests[position].status == RequestStatus::Approved {
                    ride.seats_taken = ride.seats_taken.saturating_sub(1);
                }
                ride.requests[position].status = RequestStatus::Rejected;
                Ok(())
            })
            .await?;

        tracing::debug!(ride_id = %ride_id, user_id = %user_id, "request rejected");
        Ok(ride)
    }

    /// Withdraw the caller's own request entirely.
    ///
    /// Removes the entry rather than marking it rejected, so the user may
    /// join again later. Releases the seat if the request was approved.
    /// Idempotent: a second cancel is a no-op. Permitted on frozen rides, so
    /// approved participants can still exit after departure time.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] (ride), [`LedgerError::Store`].
    pub async fn cancel_request(
        &self,
        ride_id: &RideId,
        caller: &Caller,
    ) -> Result<Ride, LedgerError> {
        let caller_id = caller.id;
        let ride = self
            .mutate_ride(ride_id, |ride| {
                let Some(position) = ride.requests.iter().position(|r| r.user_id == caller_id)
                else {
                    return Ok(());
                };
                if ride.requests[position].status == RequestStatus::Approved {
                    ride.seats_taken = ride.seats_taken.saturating_sub(1);
                }
                ride.requests.remove(position);
                Ok(())
            })
            .await?;

        tracing::debug!(ride_id = %ride_id, user_id = %caller_id, "request cancelled");
        Ok(ride)
    }

    /// Edit time, destination, price, or comment.
    ///
    /// Author-only. On success a synthetic `system` message announcing the
    /// change is appended to the ride's chat.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`], [`LedgerError::NotFound`],
    /// [`LedgerError::Validation`] on an empty update, [`LedgerError::Store`].
    pub async fn update_ride(
        &self,
        ride_id: &RideId,
        caller: &Caller,
        update: RideUpdate,
    ) -> Result<Ride, LedgerError> {
        if update.is_empty() {
            return Err(LedgerError::Validation("update changes nothing".into()));
        }

        let caller_id = caller.id;
        let ride = self
            .mutate_ride(ride_id, |ride| {
                if ride.author_id != caller_id {
                    return Err(LedgerError::Unauthorized);
                }
                if let Some(time) = update.time {
                    ride.time = time;
                }
                if let Some(ref destination) = update.destination {
                    if destination.trim().is_empty() {
                        return Err(LedgerError::Validation("destination is required".into()));
                    }
                    ride.destination = destination.clone();
                }
                if let Some(price) = update.price {
                    ride.price = price;
                }
                if let Some(ref comment) = update.comment {
                    ride.comment = comment.clone();
                }
                Ok(())
            })
            .await?;

        let announcement = Message {
            ride_id: ride_id.clone(),
            sender_id: Sender::System,
            sender_name: "system".to_string(),
            text: format!(
                "Ride details changed: departs {} to {}",
                ride.time, ride.destination
            ),
            created_at: self.clock.now(),
        };
        self.store
            .insert(
                collections::MESSAGES,
                serde_json::to_value(&announcement)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?,
            )
            .await?;

        tracing::info!(ride_id = %ride_id, "ride updated");
        Ok(ride)
    }

    /// Remove a ride. Author or moderator.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`], [`LedgerError::NotFound`],
    /// [`LedgerError::Store`].
    pub async fn delete_ride(&self, ride_id: &RideId, caller: &Caller) -> Result<(), LedgerError> {
        let (_, ride) = self.load_ride(ride_id).await?;
        if ride.author_id != caller.id && !self.moderators.contains(&caller.id) {
            return Err(LedgerError::Unauthorized);
        }
        self.store
            .delete(collections::RIDES, ride_id.as_str())
            .await?;
        tracing::info!(ride_id = %ride_id, deleted_by = %caller.id, "ride deleted");
        Ok(())
    }

    /// Ban a user. Moderator-only; existing rides and requests are left
    /// untouched.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`], [`LedgerError::Store`].
    pub async fn ban_user(
        &self,
        caller: &Caller,
        user_id: UserId,
        name: impl Into<String>,
    ) -> Result<(), LedgerError> {
        if !self.moderators.contains(&caller.id) {
            return Err(LedgerError::Unauthorized);
        }
        let record = BanRecord {
            name: name.into(),
            banned_by: caller.id,
            banned_at: self.clock.now(),
        };
        self.store
            .put(
                collections::BANNED_USERS,
                &user_id.to_string(),
                serde_json::to_value(&record)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?,
            )
            .await?;
        tracing::info!(user_id = %user_id, banned_by = %caller.id, "user banned");
        Ok(())
    }

    /// Lift a ban. Moderator-only; unbanning a user who is not banned is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`], [`LedgerError::Store`].
    pub async fn unban_user(&self, caller: &Caller, user_id: UserId) -> Result<(), LedgerError> {
        if !self.moderators.contains(&caller.id) {
            return Err(LedgerError::Unauthorized);
        }
        self.store
            .delete(collections::BANNED_USERS, &user_id.to_string())
            .await?;
        tracing::info!(user_id = %user_id, unbanned_by = %caller.id, "user unbanned");
        Ok(())
    }

    /// Whether a ban record exists for the user.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Store`].
    pub async fn is_banned(&self, user_id: UserId) -> Result<bool, LedgerError> {
        Ok(self
            .store
            .get(collections::BANNED_USERS, &user_id.to_string())
            .await?
            .is_some())
    }

    /// Set the departure-reminder idempotency flag.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`], [`LedgerError::Store`].
    pub async fn mark_reminded(&self, ride_id: &RideId) -> Result<(), LedgerError> {
        self.mutate_ride(ride_id, |ride| {
            ride.reminded = true;
            Ok(())
        })
        .await?;
        tracing::debug!(ride_id = %ride_id, "reminder flag set");
        Ok(())
    }

    /// All rides currently in the store, skipping unparseable documents.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Store`].
    pub async fn rides(&self) -> Result<Vec<Ride>, LedgerError> {
        let docs = self.store.list(collections::RIDES).await?;
        let mut rides = Vec::with_capacity(docs.len());
        for (id, doc) in docs {
            match serde_json::from_value::<Ride>(doc) {
                Ok(mut ride) => {
                    ride.id = RideId::from(id);
                    rides.push(ride);
                }
                Err(e) => {
                    tracing::warn!(ride_id = %id, error = %e, "skipping malformed ride document");
                }
            }
        }
        Ok(rides)
    }

    /// Rides still shown in listings, ordered by departure.
    ///
    /// A ride drops out once more than the grace window has passed since its
    /// scheduled departure; until then it stays visible even when frozen.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Store`].
    pub async fn visible_rides(&self) -> Result<Vec<Ride>, LedgerError> {
        let now = self.clock.now();
        let mut rides: Vec<Ride> = self
            .rides()
            .await?
            .into_iter()
            .filter(|r| r.is_visible_within(now, self.visibility_grace))
            .collect();
        rides.sort_by_key(Ride::scheduled_at);
        Ok(rides)
    }

    /// Read one ride.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`], [`LedgerError::Store`].
    pub async fn ride(&self, ride_id: &RideId) -> Result<Ride, LedgerError> {
        let (_, ride) = self.load_ride(ride_id).await?;
        Ok(ride)
    }

    /// The current wall-clock time according to the injected clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn ensure_not_banned(&self, user_id: UserId) -> Result<(), LedgerError> {
        if self.is_banned(user_id).await? {
            tracing::info!(user_id = %user_id, "banned caller refused");
            return Err(LedgerError::Unauthorized);
        }
        Ok(())
    }

    async fn load_ride(&self, ride_id: &RideId) -> Result<(Version, Ride), LedgerError> {
        let Some(versioned) = self.store.get(collections::RIDES, ride_id.as_str()).await? else {
            return Err(LedgerError::ride_not_found(ride_id));
        };
        let mut ride: Ride = serde_json::from_value(versioned.doc)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        // The document key is authoritative; a ride whose create was
        // interrupted between insert and the follow-up write carries an
        // empty id in its body.
        ride.id = ride_id.clone();
        Ok((versioned.version, ride))
    }

    /// Optimistic-concurrency loop for seat-mutating operations.
    ///
    /// The closure runs against the freshest read on every attempt, so its
    /// checks (duplicate, frozen, seat count) hold at commit time.
    async fn mutate_ride<F>(&self, ride_id: &RideId, mut apply: F) -> Result<Ride, LedgerError>
    where
        F: FnMut(&mut Ride) -> Result<(), LedgerError>,
    {
        let mut attempt: u32 = 0;
        loop {
            let (version, mut ride) = self.load_ride(ride_id).await?;
            apply(&mut ride)?;
            debug_assert!(ride.seat_invariant_holds());

            match self
                .store
                .compare_and_swap(collections::RIDES, ride_id.as_str(), version, to_doc(&ride)?)
                .await
            {
                Ok(_) => return Ok(ride),
                Err(conflict @ StoreError::VersionConflict { .. }) => {
                    attempt += 1;
                    if attempt > self.cas_retries {
                        tracing::warn!(
                            ride_id = %ride_id,
                            attempts = attempt,
                            "compare-and-swap retries exhausted"
                        );
                        return Err(conflict.into());
                    }
                    tracing::debug!(
                        ride_id = %ride_id,
                        attempt,
                        "compare-and-swap lost the race, retrying"
                    );
                }
                Err(StoreError::Missing { .. }) => {
                    return Err(LedgerError::ride_not_found(ride_id));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn to_doc(ride: &Ride) -> Result<Value, StoreError> {
    serde_json::to_value(ride).map_err(|e| StoreError::Serialization(e.to_string()))
}
