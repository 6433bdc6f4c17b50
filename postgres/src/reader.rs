//! Pool-level catalog reads behind the customer listings.
//!
//! Each method is one statement on its own pooled connection, so the read
//! aggregator can run them concurrently.

use crate::PostgresStore;
use crate::rows::{AcquiredTicketRow, ArtistRow, EventRow, LocationRow, PromotorRow, ShowRow};
use crate::store::{SELECT_LOCATION, db_error, tickets};
use async_trait::async_trait;
use ticket_stock_core::store::{CatalogReader, StoreError};
use ticket_stock_core::types::{
    AcquiredTicket, Artist, CustomerId, Event, EventId, Location, Promotor, Show, ShowId,
};

#[async_trait]
impl CatalogReader for PostgresStore {
    async fn count_events(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT count(id) FROM event")
            .fetch_one(self.pool())
            .await
            .map_err(|e| db_error("count events", &e))?;
        Ok(count)
    }

    async fn list_events(&self, offset: i64, limit: i64) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r"
            SELECT id, name, description, status, created_at, updated_at
            FROM event
            ORDER BY id DESC
            OFFSET $1
            LIMIT $2
            ",
        )
        .bind(offset)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_error("list events", &e))?;

        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn list_artists(&self, event_id: &EventId) -> Result<Vec<Artist>, StoreError> {
        let rows = sqlx::query_as::<_, ArtistRow>(
            "SELECT name FROM artist WHERE event_id = $1 ORDER BY id",
        )
        .bind(event_id.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_error("list artists", &e))?;

        Ok(rows.into_iter().map(Artist::from).collect())
    }

    async fn list_promotors(&self, event_id: &EventId) -> Result<Vec<Promotor>, StoreError> {
        let rows = sqlx::query_as::<_, PromotorRow>(
            "SELECT name, email, phone FROM promotor WHERE event_id = $1 ORDER BY id",
        )
        .bind(event_id.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_error("list promotors", &e))?;

        Ok(rows.into_iter().map(Promotor::from).collect())
    }

    async fn list_shows(&self, event_id: &EventId) -> Result<Vec<Show>, StoreError> {
        let rows = sqlx::query_as::<_, ShowRow>(
            r#"
            SELECT id, event_id, venue, "type", "time", status
            FROM "show"
            WHERE event_id = $1
            ORDER BY "time", id
            "#,
        )
        .bind(event_id.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_error("list shows", &e))?;

        Ok(rows.into_iter().map(Show::from).collect())
    }

    async fn show_location(&self, show_id: &ShowId) -> Result<Location, StoreError> {
        sqlx::query_as::<_, LocationRow>(SELECT_LOCATION)
            .bind(show_id.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| db_error("find location", &e))?
            .map(Location::from)
            .ok_or_else(|| StoreError::not_found("location", show_id))
    }

    async fn count_acquired_tickets(&self, customer_id: CustomerId) -> Result<i64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT count(id) FROM acquired_ticket WHERE customer_id = $1")
                .bind(customer_id.0)
                .fetch_one(self.pool())
                .await
                .map_err(|e| db_error("count acquired tickets", &e))?;
        Ok(count)
    }

    async fn list_acquired_tickets(
        &self,
        customer_id: CustomerId,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AcquiredTicket>, StoreError> {
        let rows = sqlx::query_as::<_, AcquiredTicketRow>(
            r#"
            SELECT
                id, "number", event_id, show_id, tier, ticket_stock_id, event_name, show_venue,
                show_type, show_country, show_city, show_formatted_address, show_time,
                customer_name, customer_email, customer_id, created_at, order_id
            FROM acquired_ticket
            WHERE customer_id = $1
            ORDER BY id DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(customer_id.0)
        .bind(offset)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_error("list acquired tickets", &e))?;

        Ok(tickets(rows))
    }
}
