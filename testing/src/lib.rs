//! # Ridepool Testing
//!
//! In-memory implementations of the ridepool external contracts plus test
//! helpers:
//!
//! - [`MemoryStore`]: versioned document store with compare-and-swap and
//!   broadcast-backed change streams
//! - [`RecordingMessenger`]: captures outbound notifications and simulates
//!   unreachable recipients
//! - [`mocks::FixedClock`] / [`mocks::ManualClock`]: deterministic time
//! - [`RideBuilder`] / [`seed_ride`]: ride fixtures
//!
//! ## Example
//!
//! ```ignore
//! use ridepool_testing::{MemoryStore, RecordingMessenger, mocks::test_clock};
//!
//! #[tokio::test]
//! async fn test_join_flow() {
//!     let store = MemoryStore::new();
//!     let messenger = RecordingMessenger::new();
//!     let clock = test_clock();
//!     // wire into the engine under test...
//! }
//! ```

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

pub mod builders;
pub mod messenger_mock;
pub mod store_mock;

/// Mock implementations of the environment traits.
pub mod mocks {
    use chrono::{DateTime, TimeDelta, Utc};
    use ridepool_core::environment::Clock;
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests.
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use ridepool_testing::mocks::FixedClock;
    /// use ridepool_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that tests can set or advance while the engine is running.
    ///
    /// Clones share the same underlying time.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a manual clock starting at the given time.
        #[must_use]
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(start)),
            }
        }

        /// Jump to an absolute time.
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap() = time;
        }

        /// Move the clock forward.
        pub fn advance(&self, delta: TimeDelta) {
            let mut time = self.time.write().unwrap();
            *time += delta;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-06-01 08:00:00 UTC).
    ///
    /// # Panics
    ///
    /// Panics only if the hardcoded timestamp fails to parse, which cannot
    /// happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-06-01T08:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use builders::{RideBuilder, seed_ride};
pub use messenger_mock::RecordingMessenger;
pub use mocks::{FixedClock, ManualClock, test_clock};
pub use store_mock::MemoryStore;
