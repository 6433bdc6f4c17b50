//! Injected dependencies that the acquisition logic must not reach for directly.
//!
//! All time reads go through [`Clock`] so that tests can pin "now" and assert on
//! `last_stock_update` / `created_at` exactly.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```
/// use ticket_stock_core::environment::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let before = chrono::Utc::now();
/// assert!(clock.now() >= before);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
