//! `PostgreSQL` storage for the ticket-stock service.
//!
//! This crate provides [`PostgresStore`], which implements every storage
//! capability from `ticket-stock-core` on top of sqlx:
//!
//! - Transaction coordination on a pooled connection
//! - Row-level inventory locking with `SELECT ... FOR UPDATE`
//! - Catalog lookups that run inside a transaction or straight on the pool
//! - Acquired-ticket inserts, with duplicate numbers reported as `Conflict`
//! - Independent catalog reads for the customer listings
//!
//! The schema lives in `migrations/` and is applied by [`PostgresStore::migrate`].
//!
//! # Example
//!
//! ```no_run
//! use ticket_stock_postgres::PostgresStore;
//! use ticket_stock_core::store::{StockLedger, TransactionCoordinator};
//! use ticket_stock_core::types::TicketStockId;
//!
//! # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresStore::new(pool);
//! let mut tx = store.begin().await?;
//! let stock = store.lock_for_update(&TicketStockId::new("S1"), &mut tx).await?;
//! println!("{} of {} sold", stock.acquired, stock.allocation);
//! store.rollback(tx).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod reader;
mod rows;
mod store;

pub use store::{PgTx, PostgresStore};
