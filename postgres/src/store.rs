//! Transactional capabilities: coordinator, stock ledger, catalog lookup and recorder.

use crate::rows::{AcquiredTicketRow, EventRow, LocationRow, ShowRow, TicketStockRow};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use ticket_stock_core::store::{
    AcquisitionRecorder, CatalogLookup, StockLedger, StoreError, TransactionCoordinator,
};
use ticket_stock_core::types::{
    AcquiredTicket, AcquiredTicketId, Event, EventId, Location, Show, ShowId, TicketStock,
    TicketStockId,
};

/// Transaction handle used by [`PostgresStore`].
pub type PgTx = Transaction<'static, Postgres>;

const SELECT_STOCK_FOR_UPDATE: &str = r"
    SELECT event_id, show_id, id, online_for, tier, allocation, price, acquired, last_stock_update
    FROM ticket_stock
    WHERE id = $1
    FOR UPDATE
";

const UPDATE_STOCK: &str = r"
    UPDATE ticket_stock
    SET acquired = $2, last_stock_update = $3
    WHERE id = $1
";

const SELECT_EVENT: &str = r"
    SELECT id, name, description, status, created_at, updated_at
    FROM event
    WHERE id = $1
    LIMIT 1
";

const SELECT_SHOW: &str = r#"
    SELECT id, event_id, venue, "type", "time", status
    FROM "show"
    WHERE id = $1
    LIMIT 1
"#;

pub(crate) const SELECT_LOCATION: &str = r"
    SELECT country, city, formatted_address, latitude, longitude
    FROM location
    WHERE show_id = $1
    LIMIT 1
";

const INSERT_ACQUIRED_TICKET: &str = r#"
    INSERT INTO acquired_ticket (
        "number", event_id, show_id, tier, ticket_stock_id, event_name, show_venue, show_type,
        show_country, show_city, show_formatted_address, show_time, customer_name,
        customer_email, customer_id, created_at, order_id
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
    RETURNING id
"#;

/// Translate a driver error, keeping unique violations distinguishable.
pub(crate) fn db_error(context: &str, e: &sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = e {
        if db.is_unique_violation() {
            metrics::counter!("ticket_stock_postgres_unique_violations_total").increment(1);
            return StoreError::Conflict(format!("{context}: {}", db.message()));
        }
    }
    tracing::error!(error = %e, context, "Postgres operation failed");
    StoreError::Database(format!("{context}: {e}"))
}

/// `PostgreSQL`-backed store.
///
/// Stock rows are serialized with `SELECT ... FOR UPDATE` inside the caller's
/// transaction, so several service instances can share one database safely.
///
/// # Example
///
/// ```no_run
/// use ticket_stock_postgres::PostgresStore;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresStore::connect("postgres://localhost/tickets", 10, Duration::from_secs(5)).await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the pool cannot be established.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| db_error("connect", &e))?;
        Ok(Self::new(pool))
    }

    /// Underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if migrations fail.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl TransactionCoordinator for PostgresStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", &e))
    }

    async fn commit(&self, tx: PgTx) -> Result<(), StoreError> {
        tx.commit()
            .await
            .map_err(|e| db_error("commit transaction", &e))
    }

    async fn rollback(&self, tx: PgTx) -> Result<(), StoreError> {
        tx.rollback()
            .await
            .map_err(|e| db_error("rollback transaction", &e))
    }
}

#[async_trait]
impl StockLedger<PgTx> for PostgresStore {
    async fn lock_for_update(
        &self,
        stock_id: &TicketStockId,
        tx: &mut PgTx,
    ) -> Result<TicketStock, StoreError> {
        sqlx::query_as::<_, TicketStockRow>(SELECT_STOCK_FOR_UPDATE)
            .bind(stock_id.as_str())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| db_error("lock ticket stock", &e))?
            .map(TicketStock::from)
            .ok_or_else(|| StoreError::not_found("ticket stock", stock_id))
    }

    async fn update(
        &self,
        stock_id: &TicketStockId,
        stock: &TicketStock,
        tx: &mut PgTx,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(UPDATE_STOCK)
            .bind(stock_id.as_str())
            .bind(stock.acquired)
            .bind(stock.last_stock_update)
            .execute(&mut **tx)
            .await
            .map_err(|e| db_error("update ticket stock", &e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("ticket stock", stock_id));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogLookup<PgTx> for PostgresStore {
    async fn find_event_by_id(
        &self,
        id: &EventId,
        tx: Option<&mut PgTx>,
    ) -> Result<Event, StoreError> {
        let query = sqlx::query_as::<_, EventRow>(SELECT_EVENT).bind(id.as_str());
        let row = match tx {
            Some(tx) => query.fetch_optional(&mut **tx).await,
            None => query.fetch_optional(&self.pool).await,
        }
        .map_err(|e| db_error("find event", &e))?;

        row.map(Event::from)
            .ok_or_else(|| StoreError::not_found("event", id))
    }

    async fn find_show_by_id(&self, id: &ShowId, tx: Option<&mut PgTx>) -> Result<Show, StoreError> {
        let query = sqlx::query_as::<_, ShowRow>(SELECT_SHOW).bind(id.as_str());
        let row = match tx {
            Some(tx) => query.fetch_optional(&mut **tx).await,
            None => query.fetch_optional(&self.pool).await,
        }
        .map_err(|e| db_error("find show", &e))?;

        row.map(Show::from)
            .ok_or_else(|| StoreError::not_found("show", id))
    }

    async fn find_location_by_show_id(
        &self,
        show_id: &ShowId,
        tx: Option<&mut PgTx>,
    ) -> Result<Location, StoreError> {
        let query = sqlx::query_as::<_, LocationRow>(SELECT_LOCATION).bind(show_id.as_str());
        let row = match tx {
            Some(tx) => query.fetch_optional(&mut **tx).await,
            None => query.fetch_optional(&self.pool).await,
        }
        .map_err(|e| db_error("find location", &e))?;

        row.map(Location::from)
            .ok_or_else(|| StoreError::not_found("location", show_id))
    }
}

#[async_trait]
impl AcquisitionRecorder<PgTx> for PostgresStore {
    async fn save(
        &self,
        ticket: &AcquiredTicket,
        tx: &mut PgTx,
    ) -> Result<AcquiredTicketId, StoreError> {
        let id: (i64,) = sqlx::query_as(INSERT_ACQUIRED_TICKET)
            .bind(&ticket.number)
            .bind(ticket.event_id.as_str())
            .bind(ticket.show_id.as_str())
            .bind(&ticket.tier)
            .bind(ticket.ticket_stock_id.as_str())
            .bind(&ticket.event_name)
            .bind(&ticket.show_venue)
            .bind(&ticket.show_type)
            .bind(&ticket.show_country)
            .bind(&ticket.show_city)
            .bind(&ticket.show_formatted_address)
            .bind(ticket.show_time)
            .bind(&ticket.customer_name)
            .bind(&ticket.customer_email)
            .bind(ticket.customer_id.0)
            .bind(ticket.created_at)
            .bind(ticket.order_id.as_str())
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| db_error("insert acquired ticket", &e))?;

        tracing::debug!(
            ticket_id = id.0,
            number = %ticket.number,
            order_id = %ticket.order_id,
            "Acquired ticket recorded"
        );

        Ok(AcquiredTicketId(id.0))
    }
}

/// Convert acquired-ticket rows.
pub(crate) fn tickets(rows: Vec<AcquiredTicketRow>) -> Vec<AcquiredTicket> {
    rows.into_iter().map(AcquiredTicket::from).collect()
}
