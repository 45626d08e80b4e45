//! Injected dependencies shared across components.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability.
///
/// Every "today", freshness, and visibility comparison goes through the
/// injected clock, so tests can pin or advance time deterministically.
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
