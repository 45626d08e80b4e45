//! Coordination engine for shared intercity rides.
//!
//! Sits between a document store and an outbound messaging transport:
//!
//! - [`ledger::RideLedger`] owns all ride and request mutations, keeping
//!   `seatsTaken` consistent with the approved request count under
//!   concurrent operations via compare-and-swap.
//! - [`detector::ChangeDetector`] reconstructs discrete events from the
//!   store's snapshot change streams.
//! - [`scheduler::ReminderScheduler`] emits one departure reminder per
//!   ride, guarded by a persisted flag.
//! - [`dispatcher::NotificationDispatcher`] fans events out to recipients,
//!   fire-and-forget.
//! - [`broadcast::BroadcastChannel`] carries global notices with a
//!   freshness window.
//!
//! [`engine::Engine`] assembles the pieces; [`config::Config`] supplies the
//! knobs from the environment.
//!
//! ```no_run
//! use ridepool_engine::config::Config;
//! use ridepool_engine::engine::{Engine, shutdown_signal};
//! # async fn run(
//! #     store: std::sync::Arc<dyn ridepool_core::store::DocumentStore>,
//! #     messenger: std::sync::Arc<dyn ridepool_core::transport::Messenger>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env();
//! ridepool_engine::telemetry::init(&config.log_level);
//!
//! let clock = std::sync::Arc::new(ridepool_core::environment::SystemClock);
//! let mut engine = Engine::new(store, messenger, clock, &config);
//! engine.start().await?;
//! shutdown_signal().await;
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod config;
pub mod detector;
pub mod dispatcher;
pub mod engine;
pub mod ledger;
pub mod scheduler;
pub mod telemetry;

pub use broadcast::BroadcastChannel;
pub use config::Config;
pub use detector::{ChangeDetector, DiffCache};
pub use dispatcher::NotificationDispatcher;
pub use engine::{Engine, shutdown_signal};
pub use ledger::RideLedger;
pub use scheduler::ReminderScheduler;
