//! # Ticket Stock Testing
//!
//! Testing utilities for the ticket-stock service.
//!
//! This crate provides:
//! - [`InMemoryStore`]: every storage capability, with real row-lock waiting
//! - [`InMemoryEventBus`]: records publishes and settlements
//! - [`FixedClock`] / [`test_clock`]: deterministic time
//! - [`fixtures`]: a seeded catalog and order builders
//!
//! ## Example
//!
//! ```
//! use ticket_stock_testing::{InMemoryStore, fixtures};
//! use ticket_stock_core::types::TicketStockId;
//!
//! let store = InMemoryStore::new();
//! fixtures::seed_catalog(&store);
//! let stock = store.stock(&TicketStockId::new(fixtures::STOCK_ID));
//! assert_eq!(stock.map(|s| s.acquired), Some(40));
//! ```

use chrono::{DateTime, Utc};
use ticket_stock_core::environment::Clock;

pub mod event_bus;
pub mod fixtures;
pub mod store;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making `created_at` and
    /// `last_stock_update` assertions exact.
    ///
    /// # Example
    ///
    /// ```
    /// use ticket_stock_testing::mocks::FixedClock;
    /// use ticket_stock_core::environment::Clock;
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
        /// Create a new fixed clock with the given time
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

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ticket_stock=debug")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use event_bus::{InMemoryEventBus, PublishedMessage, Settlement};
pub use mocks::{FixedClock, test_clock};
pub use store::{InMemoryStore, InMemoryTx};
