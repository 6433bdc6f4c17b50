//! Catalog read aggregator behind the customer listings.
//!
//! Every listing is assembled from independent single-statement reads that are
//! issued concurrently through [`ticket_stock_runtime::scatter`]. The first
//! failing read cancels its siblings and becomes the listing's error.

use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use ticket_stock_core::store::{CatalogReader, StoreError};
use ticket_stock_core::types::{AcquiredTicket, CustomerId, Event, EventId, Location, Show};
use ticket_stock_runtime::metrics::CatalogMetrics;
use ticket_stock_runtime::scatter::{ScatterError, Task, try_join_all, try_join2};

/// Why a catalog read failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// A referenced record does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Page or size below 1.
    #[error("page and size must be at least 1 (page {page}, size {size})")]
    InvalidPage {
        /// Requested page
        page: i64,
        /// Requested page size
        size: i64,
    },

    /// Storage failure.
    #[error("catalog read failed: {0}")]
    Infrastructure(String),

    /// The read did not finish within the configured deadline.
    #[error("catalog read timed out")]
    Timeout,
}

impl From<StoreError> for CatalogError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => Self::NotFound(e.to_string()),
            StoreError::Conflict(msg) | StoreError::Database(msg) => Self::Infrastructure(msg),
        }
    }
}

impl From<ScatterError<Self>> for CatalogError {
    fn from(e: ScatterError<Self>) -> Self {
        match e {
            ScatterError::Failed(inner) => inner,
            other => Self::Infrastructure(other.to_string()),
        }
    }
}

/// One page of events with their artists and promotors attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventPage {
    /// Number of events across all pages
    pub total: i64,
    /// Events on this page, newest first
    pub events: Vec<Event>,
}

/// A show together with its venue location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShowView {
    /// The show
    #[serde(flatten)]
    pub show: Show,
    /// Where it takes place
    pub location: Location,
}

/// One page of a customer's acquired tickets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquiredTicketPage {
    /// Number of tickets the customer holds
    pub total: i64,
    /// Tickets on this page, newest first
    pub tickets: Vec<AcquiredTicket>,
}

/// Turn a 1-based page into `(offset, limit)`.
///
/// # Errors
///
/// [`CatalogError::InvalidPage`] if `page` or `size` is below 1, or the offset
/// would overflow.
pub fn paging(page: i64, size: i64) -> Result<(i64, i64), CatalogError> {
    let invalid = CatalogError::InvalidPage { page, size };
    if page < 1 || size < 1 {
        return Err(invalid);
    }
    let offset = (page - 1).checked_mul(size).ok_or(invalid)?;
    Ok((offset, size))
}

/// Read aggregator over a [`CatalogReader`].
#[derive(Clone)]
pub struct CatalogQueries {
    reader: Arc<dyn CatalogReader>,
    timeout: Duration,
}

impl CatalogQueries {
    /// Create the aggregator; every listing must finish within `timeout`.
    #[must_use]
    pub fn new(reader: Arc<dyn CatalogReader>, timeout: Duration) -> Self {
        Self { reader, timeout }
    }

    async fn bounded<T>(
        &self,
        query: &'static str,
        read: impl Future<Output = Result<T, CatalogError>>,
    ) -> Result<T, CatalogError> {
        let result = tokio::time::timeout(self.timeout, read)
            .await
            .unwrap_or(Err(CatalogError::Timeout));
        if let Err(e) = &result {
            CatalogMetrics::record_error(query);
            tracing::warn!(query, error = %e, "Catalog read failed");
        }
        result
    }

    /// One page of events, each with artists and promotors.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::InvalidPage`] for a page or size below 1
    /// - [`CatalogError::Infrastructure`] if any underlying read fails
    /// - [`CatalogError::Timeout`] past the deadline
    #[tracing::instrument(skip(self))]
    pub async fn get_many_events(&self, page: i64, size: i64) -> Result<EventPage, CatalogError> {
        let (offset, limit) = paging(page, size)?;
        let reader = Arc::clone(&self.reader);

        self.bounded("events", async move {
            let count = {
                let reader = Arc::clone(&reader);
                async move { reader.count_events().await.map_err(CatalogError::from) }
            };
            let list = {
                let reader = Arc::clone(&reader);
                async move {
                    reader
                        .list_events(offset, limit)
                        .await
                        .map_err(CatalogError::from)
                }
            };
            let (total, events) = try_join2(count, list).await?;

            let details: Vec<Task<Event, CatalogError>> = events
                .into_iter()
                .map(|event| with_details(Arc::clone(&reader), event))
                .collect();
            let events = try_join_all(details).await?;

            Ok::<_, CatalogError>(EventPage { total, events })
        })
        .await
    }

    /// Every show of an event, each with its location.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::NotFound`] if a show has no location
    /// - [`CatalogError::Infrastructure`] if any underlying read fails
    /// - [`CatalogError::Timeout`] past the deadline
    #[tracing::instrument(skip(self))]
    pub async fn get_many_shows(&self, event_id: &EventId) -> Result<Vec<ShowView>, CatalogError> {
        let reader = Arc::clone(&self.reader);

        self.bounded("shows", async move {
            let shows = reader.list_shows(event_id).await?;

            let views: Vec<Task<ShowView, CatalogError>> = shows
                .into_iter()
                .map(|show| {
                    let reader = Arc::clone(&reader);
                    async move {
                        let location = reader.show_location(&show.id).await?;
                        Ok::<_, CatalogError>(ShowView { show, location })
                    }
                    .boxed()
                })
                .collect();
            Ok::<_, CatalogError>(try_join_all(views).await?)
        })
        .await
    }

    /// One page of a customer's acquired tickets.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::InvalidPage`] for a page or size below 1
    /// - [`CatalogError::Infrastructure`] if any underlying read fails
    /// - [`CatalogError::Timeout`] past the deadline
    #[tracing::instrument(skip(self))]
    pub async fn get_acquired_tickets(
        &self,
        customer_id: CustomerId,
        page: i64,
        size: i64,
    ) -> Result<AcquiredTicketPage, CatalogError> {
        let (offset, limit) = paging(page, size)?;
        let reader = Arc::clone(&self.reader);

        self.bounded("acquired_tickets", async move {
            let count = {
                let reader = Arc::clone(&reader);
                async move {
                    reader
                        .count_acquired_tickets(customer_id)
                        .await
                        .map_err(CatalogError::from)
                }
            };
            let list = async move {
                reader
                    .list_acquired_tickets(customer_id, offset, limit)
                    .await
                    .map_err(CatalogError::from)
            };
            let (total, tickets) = try_join2(count, list).await?;
            Ok::<_, CatalogError>(AcquiredTicketPage { total, tickets })
        })
        .await
    }
}

fn with_details(reader: Arc<dyn CatalogReader>, event: Event) -> Task<Event, CatalogError> {
    async move {
        let artists = {
            let reader = Arc::clone(&reader);
            let id = event.id.clone();
            async move { reader.list_artists(&id).await.map_err(CatalogError::from) }
        };
        let promotors = {
            let id = event.id.clone();
            async move { reader.list_promotors(&id).await.map_err(CatalogError::from) }
        };
        let (artists, promotors) = try_join2(artists, promotors).await?;
        Ok::<_, CatalogError>(Event {
            artists,
            promotors,
            ..event
        })
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_is_one_based() {
        assert_eq!(paging(1, 10), Ok((0, 10)));
        assert_eq!(paging(3, 25), Ok((50, 25)));
    }

    #[test]
    fn paging_rejects_zero_and_negative() {
        assert_eq!(
            paging(0, 10),
            Err(CatalogError::InvalidPage { page: 0, size: 10 })
        );
        assert_eq!(
            paging(1, 0),
            Err(CatalogError::InvalidPage { page: 1, size: 0 })
        );
        assert!(paging(-4, -4).is_err());
    }

    #[test]
    fn paging_rejects_overflowing_offset() {
        assert!(paging(i64::MAX, 2).is_err());
    }

    #[test]
    fn scatter_failures_unwrap_to_catalog_errors() {
        let failed = CatalogError::from(ScatterError::Failed(CatalogError::Timeout));
        assert_eq!(failed, CatalogError::Timeout);

        let panicked = CatalogError::from(ScatterError::<CatalogError>::Panicked("boom".into()));
        assert!(matches!(panicked, CatalogError::Infrastructure(_)));
    }
}
