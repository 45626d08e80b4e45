//! # Ridepool Core
//!
//! Domain types and external contracts for the ridepool coordination core.
//!
//! This crate defines:
//!
//! - The [`ride`] aggregate (rides with embedded request queues and the seat
//!   invariant), plus [`message`], [`broadcast`], and [`identity`] documents
//! - The [`event::RideEvent`] enum the change-detection layer produces
//! - The external contracts everything else is expressed against:
//!   [`store::DocumentStore`] (versioned documents, compare-and-swap, change
//!   streams), [`transport::Messenger`] (fire-and-forget delivery), and
//!   [`environment::Clock`]
//! - The [`error::LedgerError`] taxonomy
//!
//! No I/O lives here; the engine crate implements the protocol on top of
//! these contracts, and `ridepool-testing` provides in-memory
//! implementations.
//!
//! ## Example
//!
//! ```
//! use ridepool_core::ride::{DepartureTime, Direction, UserId};
//!
//! let time: DepartureTime = "08:30".parse()?;
//! assert_eq!(time.to_string(), "08:30");
//! assert!(UserId::new(123_456).is_routable());
//! assert_eq!(Direction::ToCity.to_string(), "to the city");
//! # Ok::<(), ridepool_core::ride::ParseDepartureTimeError>(())
//! ```

pub mod broadcast;
pub mod environment;
pub mod error;
pub mod event;
pub mod identity;
pub mod message;
pub mod ride;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::LedgerError;
pub use event::RideEvent;
pub use ride::{Request, RequestStatus, Ride, RideId, UserId};
