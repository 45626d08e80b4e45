//! Ride and request domain types.
//!
//! A [`Ride`] is the unit of contention in the system: it owns its embedded
//! [`Request`] sequence and the `seats_taken` counter, and the two are only
//! ever mutated together through a whole-document transactional rewrite.
//!
//! # Seat Invariant
//!
//! At every observable point in time:
//!
//! - `0 <= seats_taken <= seats_total`
//! - `seats_taken` equals the number of requests with status
//!   [`RequestStatus::Approved`]

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Minutes a ride stays visible (frozen) past its scheduled departure.
pub const VISIBILITY_GRACE_MINUTES: i64 = 10;

/// Opaque ride identifier, assigned by the document store.
///
/// # Examples
///
/// ```
/// use ridepool_core::ride::RideId;
///
/// let id = RideId::new("ride-42");
/// assert_eq!(id.as_str(), "ride-42");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RideId(String);

impl RideId {
    /// Create a ride id from a store-assigned key.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RideId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RideId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Numeric user identifier supplied by the external identity layer.
///
/// Identifiers with fewer than five digits are synthetic test identities and
/// are never routable through the messaging transport.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(i64);

impl UserId {
    /// Create a user id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Whether this id belongs to a real, message-routable identity.
    ///
    /// Synthetic identities (fewer than five digits) are silently skipped by
    /// the notification layer.
    #[must_use]
    pub const fn is_routable(self) -> bool {
        // unsigned_abs: ids come from untrusted documents, and abs() would
        // overflow on i64::MIN.
        self.0.unsigned_abs() >= 10_000
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Travel direction of a ride.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// From the campus into the city.
    ToCity,
    /// From the city back to the center.
    ToCenter,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToCity => write!(f, "to the city"),
            Self::ToCenter => write!(f, "to the center"),
        }
    }
}

/// Error type for [`DepartureTime`] parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid departure time: {0}")]
pub struct ParseDepartureTimeError(String);

/// A minute-resolution departure time, stored and compared as `HH:MM`.
///
/// Seconds are always zero, so equality between two values is minute-exact.
/// The reminder scheduler relies on this when matching `now + lead` against
/// stored trip times.
///
/// # Examples
///
/// ```
/// use ridepool_core::ride::DepartureTime;
///
/// let t: DepartureTime = "08:05".parse().unwrap();
/// assert_eq!(t.to_string(), "08:05");
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DepartureTime(NaiveTime);

impl DepartureTime {
    /// Create a departure time from hour and minute.
    ///
    /// Returns `None` when hour or minute is out of range.
    #[must_use]
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    /// Minute-truncated departure time taken from a wall-clock instant.
    #[must_use]
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let t = at.time();
        // Seconds truncated: equality stays minute-exact.
        Self(NaiveTime::from_hms_opt(t.hour(), t.minute(), 0).unwrap_or(NaiveTime::MIN))
    }

    /// Get the underlying minute-resolution time of day.
    #[must_use]
    pub const fn as_naive_time(self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for DepartureTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl FromStr for DepartureTime {
    type Err = ParseDepartureTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s, "%H:%M")
            .map(Self)
            .map_err(|e| ParseDepartureTimeError(format!("{s:?}: {e}")))
    }
}

impl TryFrom<String> for DepartureTime {
    type Error = ParseDepartureTimeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DepartureTime> for String {
    fn from(t: DepartureTime) -> Self {
        t.to_string()
    }
}

/// Approval status of a join request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Awaiting the author's decision.
    Pending,
    /// Occupying a seat.
    Approved,
    /// Denied or excluded; still blocks a re-join.
    Rejected,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// One user's bid to join a ride, embedded in the ride document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Requesting user.
    pub user_id: UserId,
    /// Display name at the time of the request.
    pub name: String,
    /// Optional contact handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
    /// Current approval status.
    pub status: RequestStatus,
}

/// Lifecycle status of a ride document.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    /// Open for requests (subject to the freeze/visibility rules).
    Active,
}

/// One offered shared trip with a seat capacity and a request queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    /// Store-assigned identifier.
    pub id: RideId,
    /// The offering user.
    pub author_id: UserId,
    /// Author's display name.
    pub author: String,
    /// Author's optional contact handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
    /// Travel direction.
    pub direction: Direction,
    /// Calendar date of departure.
    pub date: NaiveDate,
    /// Minute-resolution departure time.
    pub time: DepartureTime,
    /// Free-text destination.
    pub destination: String,
    /// Whether the author offers a car (vs. requests a shared taxi).
    pub is_driver: bool,
    /// Seat capacity: 1..=4 for drivers, 1..=3 otherwise.
    pub seats_total: u8,
    /// Seats currently held by approved requests.
    pub seats_taken: u8,
    /// Embedded request queue, unique by `user_id`.
    #[serde(default)]
    pub requests: Vec<Request>,
    /// Optional price per seat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<u32>,
    /// Free-text comment.
    #[serde(default)]
    pub comment: String,
    /// Lifecycle status.
    pub status: RideStatus,
    /// Idempotency flag for the departure reminder.
    #[serde(default)]
    pub reminded: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Ride {
    /// Maximum seats for a driver-offered ride.
    pub const MAX_DRIVER_SEATS: u8 = 4;
    /// Maximum seats for a shared-taxi request.
    pub const MAX_TAXI_SEATS: u8 = 3;

    /// Scheduled departure as a UTC instant.
    #[must_use]
    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.date.and_time(self.time.as_naive_time()).and_utc()
    }

    /// A frozen ride has departed but is still inside the visibility grace
    /// window: no new joins, but approved participants may still cancel.
    #[must_use]
    pub fn is_frozen(&self, now: DateTime<Utc>) -> bool {
        now >= self.scheduled_at()
    }

    /// Whether the ride still appears in listings, under the default grace
    /// window of [`VISIBILITY_GRACE_MINUTES`].
    #[must_use]
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.is_visible_within(now, TimeDelta::minutes(VISIBILITY_GRACE_MINUTES))
    }

    /// Whether the ride still appears in listings under the given grace
    /// window past departure.
    #[must_use]
    pub fn is_visible_within(&self, now: DateTime<Utc>, grace: TimeDelta) -> bool {
        now < self.scheduled_at() + grace
    }

    /// Find the request made by `user_id`, if any.
    #[must_use]
    pub fn request(&self, user_id: UserId) -> Option<&Request> {
        self.requests.iter().find(|r| r.user_id == user_id)
    }

    /// All requests currently occupying a seat.
    pub fn approved_requests(&self) -> impl Iterator<Item = &Request> {
        self.requests
            .iter()
            .filter(|r| r.status == RequestStatus::Approved)
    }

    /// Whether every seat is taken.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.seats_taken >= self.seats_total
    }

    /// Check the seat invariant against the embedded request list.
    #[must_use]
    pub fn seat_invariant_holds(&self) -> bool {
        let approved = self.approved_requests().count();
        usize::from(self.seats_taken) == approved && self.seats_taken <= self.seats_total
    }

    /// Validate the seat capacity for the ride kind.
    #[must_use]
    pub const fn seats_in_range(is_driver: bool, seats_total: u8) -> bool {
        let max = if is_driver {
            Self::MAX_DRIVER_SEATS
        } else {
            Self::MAX_TAXI_SEATS
        };
        seats_total >= 1 && seats_total <= max
    }
}

/// Author-supplied fields for creating a ride.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RideDetails {
    /// Travel direction.
    pub direction: Direction,
    /// Calendar date of departure.
    pub date: NaiveDate,
    /// Minute-resolution departure time.
    pub time: DepartureTime,
    /// Free-text destination.
    pub destination: String,
    /// Whether the author offers a car.
    pub is_driver: bool,
    /// Seat capacity.
    pub seats_total: u8,
    /// Optional price per seat.
    pub price: Option<u32>,
    /// Free-text comment.
    pub comment: String,
}

/// Author-supplied fields for editing an existing ride.
///
/// `None` leaves the corresponding field untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RideUpdate {
    /// New departure time.
    pub time: Option<DepartureTime>,
    /// New destination.
    pub destination: Option<String>,
    /// New price (`Some(None)` clears it).
    pub price: Option<Option<u32>>,
    /// New comment.
    pub comment: Option<String>,
}

impl RideUpdate {
    /// Whether the update changes anything at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.time.is_none()
            && self.destination.is_none()
            && self.price.is_none()
            && self.comment.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ride_at(date: NaiveDate, time: DepartureTime) -> Ride {
        Ride {
            id: RideId::new("r1"),
            author_id: UserId::new(100_001),
            author: "Alice".to_string(),
            telegram: None,
            direction: Direction::ToCity,
            date,
            time,
            destination: "Airport".to_string(),
            is_driver: true,
            seats_total: 3,
            seats_taken: 0,
            requests: vec![],
            price: Some(20),
            comment: String::new(),
            status: RideStatus::Active,
            reminded: false,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 7, 0, 0).unwrap(),
        }
    }

    #[test]
    fn departure_time_round_trips_as_hh_mm() {
        let t: DepartureTime = "08:05".parse().unwrap();
        assert_eq!(t.to_string(), "08:05");
        assert_eq!(t, DepartureTime::new(8, 5).unwrap());
    }

    #[test]
    fn departure_time_rejects_garbage() {
        assert!("25:00".parse::<DepartureTime>().is_err());
        assert!("8am".parse::<DepartureTime>().is_err());
        assert!(DepartureTime::new(24, 0).is_none());
    }

    #[test]
    fn departure_time_serde_uses_string_form() {
        let t: DepartureTime = "17:30".parse().unwrap();
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"17:30\"");
        let back: DepartureTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn routable_ids_need_five_digits() {
        assert!(UserId::new(10_000).is_routable());
        assert!(UserId::new(123_456_789).is_routable());
        assert!(!UserId::new(1).is_routable());
        assert!(!UserId::new(9_999).is_routable());
        assert!(!UserId::new(-9_999).is_routable());
        // Extreme values from corrupt documents must not panic.
        assert!(UserId::new(i64::MIN).is_routable());
    }

    #[test]
    fn freeze_and_visibility_windows() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let time = DepartureTime::new(12, 0).unwrap();
        let ride = ride_at(date, time);

        let before = Utc.with_ymd_and_hms(2025, 6, 1, 11, 59, 0).unwrap();
        let departed = Utc.with_ymd_and_hms(2025, 6, 1, 12, 3, 0).unwrap();
        let long_gone = Utc.with_ymd_and_hms(2025, 6, 1, 12, 10, 0).unwrap();

        assert!(!ride.is_frozen(before));
        assert!(ride.is_visible(before));

        assert!(ride.is_frozen(departed));
        assert!(ride.is_visible(departed));

        assert!(ride.is_frozen(long_gone));
        assert!(!ride.is_visible(long_gone));

        // A wider grace window keeps the ride listed longer.
        assert!(ride.is_visible_within(long_gone, TimeDelta::minutes(60)));
        assert!(!ride.is_visible_within(departed, TimeDelta::minutes(2)));
    }

    #[test]
    fn seat_invariant_checks_approved_count() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let mut ride = ride_at(date, DepartureTime::new(12, 0).unwrap());
        assert!(ride.seat_invariant_holds());

        ride.requests.push(Request {
            user_id: UserId::new(200_001),
            name: "Bob".to_string(),
            telegram: None,
            status: RequestStatus::Approved,
        });
        assert!(!ride.seat_invariant_holds());

        ride.seats_taken = 1;
        assert!(ride.seat_invariant_holds());
    }

    #[test]
    fn seat_ranges_depend_on_ride_kind() {
        assert!(Ride::seats_in_range(true, 4));
        assert!(!Ride::seats_in_range(true, 5));
        assert!(Ride::seats_in_range(false, 3));
        assert!(!Ride::seats_in_range(false, 4));
        assert!(!Ride::seats_in_range(true, 0));
    }

    #[test]
    fn ride_serializes_with_camel_case_fields() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let ride = ride_at(date, DepartureTime::new(9, 15).unwrap());
        let value = serde_json::to_value(&ride).unwrap();
        assert_eq!(value["authorId"], 100_001);
        assert_eq!(value["seatsTaken"], 0);
        assert_eq!(value["time"], "09:15");
        assert_eq!(value["status"], "active");
    }

    proptest::proptest! {
        /// Minute truncation agrees with the stored "HH:MM" form for any
        /// instant, so the reminder matcher never misses on seconds.
        #[test]
        fn from_datetime_matches_the_minute_exact_form(secs in 0_i64..4_102_444_800) {
            let instant = Utc.timestamp_opt(secs, 0).unwrap();
            let truncated = DepartureTime::from_datetime(instant);
            let parsed: DepartureTime =
                instant.format("%H:%M").to_string().parse().unwrap();
            proptest::prop_assert_eq!(truncated, parsed);
        }
    }
}
