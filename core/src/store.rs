//! Storage capabilities used by the acquisition transaction and the catalog reads.
//!
//! The acquisition needs four narrow capabilities, all operating on one transaction
//! handle `Tx` owned by the caller:
//!
//! - [`TransactionCoordinator`]: begin / commit / rollback of a unit of work
//! - [`StockLedger`]: locked read and update of a ticket-stock row
//! - [`CatalogLookup`]: event, show and location reads, inside or outside a transaction
//! - [`AcquisitionRecorder`]: insert of an acquired ticket, returning its identity
//!
//! A "plain connection" and an "active transaction" are interchangeable executors:
//! every method that may run outside a transaction takes `Option<&mut Tx>`, and
//! passing `None` reads at the pool level.
//!
//! # Implementations
//!
//! - `PostgresStore` (in `ticket-stock-postgres`): `SELECT ... FOR UPDATE` row locks
//! - `InMemoryStore` (in `ticket-stock-testing`): per-row async mutexes held by the transaction
//!
//! # Example
//!
//! ```rust,ignore
//! let mut tx = store.begin().await?;
//! let mut stock = store.lock_for_update(&stock_id, &mut tx).await?;
//! stock.acquire(5, clock.now(), CapacityPolicy::Enforce)?;
//! store.update(&stock_id, &stock, &mut tx).await?;
//! store.commit(tx).await?;
//! ```

use crate::types::{
    AcquiredTicket, AcquiredTicketId, Artist, CustomerId, Event, EventId, Location, Promotor, Show,
    ShowId, TicketStock, TicketStockId,
};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The referenced row does not exist.
    #[error("{resource} with id '{id}' is not found")]
    NotFound {
        /// Kind of record ("event", "show", "location", "ticket stock")
        resource: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Driver, connection or I/O failure.
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Shorthand for a [`StoreError::NotFound`].
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Whether this is a [`StoreError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Opens, commits and rolls back a unit of work.
///
/// Every multi-step mutation runs under exactly one handle from `begin` to
/// `commit`/`rollback`. Implementations must release any row locks taken through
/// the handle when it is committed, rolled back or dropped.
#[async_trait]
pub trait TransactionCoordinator: Send + Sync {
    /// The transaction handle threaded through every capability.
    type Tx: Send + 'static;

    /// Start a new transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if no connection can be obtained.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Make every write done through `tx` durable and release its locks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the commit fails; nothing done through
    /// `tx` is persisted in that case.
    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;

    /// Discard every write done through `tx` and release its locks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the rollback itself fails.
    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError>;
}

/// Owner of the ticket-stock rows.
#[async_trait]
pub trait StockLedger<Tx: Send>: Send + Sync {
    /// Read a stock row and take an exclusive lock on it until `tx` ends.
    ///
    /// Concurrent callers locking the same id block here until the holder commits
    /// or rolls back. This is the only serialization point for inventory.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the row does not exist
    /// - [`StoreError::Database`] on I/O failure
    async fn lock_for_update(
        &self,
        stock_id: &TicketStockId,
        tx: &mut Tx,
    ) -> Result<TicketStock, StoreError>;

    /// Replace the mutable fields (`acquired`, `last_stock_update`) of a locked row.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the row does not exist
    /// - [`StoreError::Database`] on I/O failure
    async fn update(
        &self,
        stock_id: &TicketStockId,
        stock: &TicketStock,
        tx: &mut Tx,
    ) -> Result<(), StoreError>;
}

/// Read-only catalog accessors needed to denormalize an acquisition.
///
/// Pass `Some(tx)` to read at the acquisition's snapshot, `None` to read outside
/// any transaction.
#[async_trait]
pub trait CatalogLookup<Tx: Send>: Send + Sync {
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if absent, [`StoreError::Database`] on I/O failure.
    async fn find_event_by_id(&self, id: &EventId, tx: Option<&mut Tx>)
    -> Result<Event, StoreError>;

    /// # Errors
    ///
    /// [`StoreError::NotFound`] if absent, [`StoreError::Database`] on I/O failure.
    async fn find_show_by_id(&self, id: &ShowId, tx: Option<&mut Tx>) -> Result<Show, StoreError>;

    /// # Errors
    ///
    /// [`StoreError::NotFound`] if absent, [`StoreError::Database`] on I/O failure.
    async fn find_location_by_show_id(
        &self,
        show_id: &ShowId,
        tx: Option<&mut Tx>,
    ) -> Result<Location, StoreError>;
}

/// Persists acquired tickets.
#[async_trait]
pub trait AcquisitionRecorder<Tx: Send>: Send + Sync {
    /// Insert an acquired ticket and return the store-assigned identity.
    ///
    /// Any `id` already on `ticket` is ignored.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`] if the ticket number is already taken
    /// - [`StoreError::Database`] on I/O failure
    async fn save(&self, ticket: &AcquiredTicket, tx: &mut Tx)
    -> Result<AcquiredTicketId, StoreError>;
}

/// Independent, non-transactional reads behind the customer catalog listings.
///
/// Each method is a single query with no ordering dependency on the others, so the
/// read aggregator is free to issue them concurrently.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Total number of events.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on I/O failure.
    async fn count_events(&self) -> Result<i64, StoreError>;

    /// One page of events, newest id first, without artists/promotors attached.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on I/O failure.
    async fn list_events(&self, offset: i64, limit: i64) -> Result<Vec<Event>, StoreError>;

    /// Artists of one event.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on I/O failure.
    async fn list_artists(&self, event_id: &EventId) -> Result<Vec<Artist>, StoreError>;

    /// Promotors of one event.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on I/O failure.
    async fn list_promotors(&self, event_id: &EventId) -> Result<Vec<Promotor>, StoreError>;

    /// Shows of one event.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on I/O failure.
    async fn list_shows(&self, event_id: &EventId) -> Result<Vec<Show>, StoreError>;

    /// Location of one show.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if absent, [`StoreError::Database`] on I/O failure.
    async fn show_location(&self, show_id: &ShowId) -> Result<Location, StoreError>;

    /// Number of tickets a customer has acquired.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on I/O failure.
    async fn count_acquired_tickets(&self, customer_id: CustomerId) -> Result<i64, StoreError>;

    /// One page of a customer's acquired tickets, newest first.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on I/O failure.
    async fn list_acquired_tickets(
        &self,
        customer_id: CustomerId,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AcquiredTicket>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_resource_and_id() {
        let err = StoreError::not_found("show", "SH-9");
        assert_eq!(err.to_string(), "show with id 'SH-9' is not found");
        assert!(err.is_not_found());
        assert!(!StoreError::Database("boom".into()).is_not_found());
    }
}
