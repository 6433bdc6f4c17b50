//! # Ticket Stock Service
//!
//! The application crate: it wires the storage and bus capabilities from the
//! framework crates into the three pieces the service runs.
//!
//! - [`acquisition`]: the order-paid → sold-tickets unit of work
//! - [`intake`]: the bus consumer that drives the acquisition and acks only
//!   after it returns
//! - [`catalog`]: concurrent read aggregation for the customer listings, with
//!   [`http::ApiError`] as the error envelope
//!
//! Configuration is read from the environment by [`config::Config::from_env`].
//!
//! ## Example
//!
//! ```rust,ignore
//! let service = AcquisitionService::new(store, event_bus.clone(), clock, config);
//! let handler = Arc::new(OrderPaidHandler::new(service));
//! let consumer = EventConsumer::new("order-paid", topics, event_bus, handler, shutdown_rx);
//! let handle = consumer.spawn();
//! ```

#![forbid(unsafe_code)]

pub mod acquisition;
pub mod catalog;
pub mod config;
pub mod http;
pub mod intake;

pub use acquisition::{
    AcquisitionConfig, AcquisitionError, AcquisitionReport, AcquisitionService, Stage,
};
pub use catalog::{AcquiredTicketPage, CatalogError, CatalogQueries, EventPage, ShowView};
pub use config::Config;
pub use http::ApiError;
pub use intake::{Disposition, EventConsumer, EventHandler, IntakeError, OrderPaidHandler};
