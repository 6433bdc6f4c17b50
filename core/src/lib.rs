//! # Ticket Stock Core
//!
//! Domain types and capability traits for the ticket-stock acquisition service.
//!
//! This crate holds everything the acquisition transaction needs to talk about,
//! without committing to a storage engine or a message bus:
//!
//! - **Types**: [`TicketStock`](types::TicketStock), [`AcquiredTicket`](types::AcquiredTicket),
//!   [`OrderPaidEvent`](types::OrderPaidEvent) and the catalog records
//! - **Store**: the Stock Ledger, Catalog Lookup, Acquisition Recorder and
//!   Transaction Coordinator capabilities, plus the read-only [`CatalogReader`](store::CatalogReader)
//! - **Event bus**: keyed publish and acknowledged subscription
//! - **Environment**: the [`Clock`](environment::Clock) abstraction
//!
//! ## Architecture
//!
//! ```text
//!  Event Intake ──► Acquisition Use Case
//!                        │
//!          ┌─────────────┼──────────────────┐
//!          ▼             ▼                  ▼
//!    StockLedger   CatalogLookup   AcquisitionRecorder
//!          └─────────────┼──────────────────┘
//!                        ▼
//!             TransactionCoordinator (one Tx)
//!                        │ commit
//!                        ▼
//!                    EventBus::publish
//! ```
//!
//! Implementations live in sibling crates:
//!
//! - `ticket-stock-postgres`: `PostgreSQL` via sqlx
//! - `ticket-stock-redpanda`: Kafka-compatible bus via rdkafka
//! - `ticket-stock-testing`: in-memory store and bus with the same locking semantics

#![forbid(unsafe_code)]

pub mod environment;
pub mod event_bus;
pub mod store;
pub mod ticket_number;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
