//! Acquisition use case: turn a paid order into sold tickets.
//!
//! One call runs one unit of work:
//!
//! ```text
//! Started ─► Validated ─► Locked ─► Recorded ─► Committed ─► Published
//!                │           │          │           │
//!                ▼           └──────────┴───────────┴──► RolledBack
//!             Rejected
//! ```
//!
//! Items are processed in ascending stock id order, so two orders touching the
//! same rows always lock them in the same sequence. Every await until the
//! commit runs against one deadline; when it passes the transaction is rolled
//! back and the call fails with [`AcquisitionError::Timeout`].
//!
//! Publishing happens only after the commit. A publish failure does not undo
//! anything: the ticket lands in [`AcquisitionReport::unpublished`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use ticket_stock_core::environment::Clock;
use ticket_stock_core::event_bus::EventBus;
use ticket_stock_core::store::{
    AcquisitionRecorder, CatalogLookup, StockLedger, StoreError, TransactionCoordinator,
};
use ticket_stock_core::ticket_number::generate_ticket_number;
use ticket_stock_core::types::{
    AcquiredTicket, CapacityPolicy, InsufficientStock, OrderId, OrderItem, OrderPaidEvent,
};
use ticket_stock_runtime::metrics::AcquisitionMetrics;
use tokio::time::Instant;
use tracing::Instrument;

/// Where an acquisition is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Deadline armed, nothing touched yet
    Started,
    /// Order passed validation
    Validated,
    /// Catalog read and stock row locked
    Locked,
    /// Stock updated and ticket inserted
    Recorded,
    /// Transaction committed
    Committed,
    /// Tickets handed to the bus
    Published,
    /// Transaction abandoned after a failure
    RolledBack,
    /// Order refused before any transaction was opened
    Rejected,
}

impl Stage {
    /// Label used in logs and spans.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Validated => "validated",
            Self::Locked => "locked",
            Self::Recorded => "recorded",
            Self::Committed => "committed",
            Self::Published => "published",
            Self::RolledBack => "rolled_back",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an acquisition failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    /// A referenced event, show, location or stock row does not exist.
    #[error("{resource} with id '{id}' is not found")]
    NotFound {
        /// Kind of record
        resource: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The order itself is unusable.
    #[error("invalid order: {0}")]
    InvalidInput(String),

    /// The stock cannot cover the requested quantity.
    #[error(transparent)]
    InsufficientStock(#[from] InsufficientStock),

    /// Storage failure; retrying may succeed.
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),

    /// The deadline passed while the acquisition was at `stage`.
    #[error("acquisition timed out while {stage}")]
    Timeout {
        /// Last stage reached
        stage: Stage,
    },
}

impl AcquisitionError {
    /// Whether redelivering the same order can never succeed.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::InvalidInput(_) | Self::InsufficientStock(_)
        )
    }

    /// Metric label.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::Infrastructure(_) => "infrastructure",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl From<StoreError> for AcquisitionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { resource, id } => Self::NotFound { resource, id },
            // A ticket-number collision is cured by retrying with a fresh number
            StoreError::Conflict(msg) | StoreError::Database(msg) => Self::Infrastructure(msg),
        }
    }
}

/// Outcome of a committed acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionReport {
    /// Order that was fulfilled
    pub order_id: OrderId,
    /// Recorded tickets, with their store ids, in lock order
    pub tickets: Vec<AcquiredTicket>,
    /// Numbers of committed tickets that could not be published
    pub unpublished: Vec<String>,
}

impl AcquisitionReport {
    /// Whether every ticket reached the bus.
    #[must_use]
    pub fn fully_published(&self) -> bool {
        self.unpublished.is_empty()
    }
}

/// Tunables of the use case.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Deadline for one call, lock waits included
    pub timeout: Duration,
    /// Overselling rule
    pub capacity_policy: CapacityPolicy,
    /// Outbound topic for acquired tickets
    pub acquired_ticket_topic: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            capacity_policy: CapacityPolicy::Enforce,
            acquired_ticket_topic: "acquired-ticket".to_string(),
        }
    }
}

/// The acquisition use case.
///
/// `S` supplies every storage capability over one transaction type.
pub struct AcquisitionService<S> {
    store: Arc<S>,
    event_bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    config: AcquisitionConfig,
}

impl<S> Clone for AcquisitionService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            event_bus: Arc::clone(&self.event_bus),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

/// Run one storage call under the deadline.
async fn within<T>(
    deadline: Instant,
    stage: Stage,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, AcquisitionError> {
    match tokio::time::timeout_at(deadline, call).await {
        Ok(result) => result.map_err(AcquisitionError::from),
        Err(_) => Err(AcquisitionError::Timeout { stage }),
    }
}

fn validate(event: &OrderPaidEvent) -> Result<(), AcquisitionError> {
    if event.items.is_empty() {
        return Err(AcquisitionError::InvalidInput(format!(
            "order '{}' has no items",
            event.id
        )));
    }
    if let Some(item) = event.items.iter().find(|item| item.quantity <= 0) {
        return Err(AcquisitionError::InvalidInput(format!(
            "quantity {} for ticket stock '{}' must be positive",
            item.quantity, item.ticket_stock_id
        )));
    }
    Ok(())
}

impl<S> AcquisitionService<S>
where
    S: TransactionCoordinator
        + StockLedger<S::Tx>
        + CatalogLookup<S::Tx>
        + AcquisitionRecorder<S::Tx>
        + 'static,
{
    /// Create the use case.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        event_bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        config: AcquisitionConfig,
    ) -> Self {
        Self {
            store,
            event_bus,
            clock,
            config,
        }
    }

    /// Fulfil a paid order.
    ///
    /// # Errors
    ///
    /// - [`AcquisitionError::InvalidInput`] for an order without items or with a
    ///   non-positive quantity; no transaction is opened
    /// - [`AcquisitionError::NotFound`] when a referenced row is missing
    /// - [`AcquisitionError::InsufficientStock`] when a stock cannot cover its item
    /// - [`AcquisitionError::Infrastructure`] on storage failure, commit included
    /// - [`AcquisitionError::Timeout`] when the deadline passes before the commit
    ///
    /// Every failure leaves stock and tickets exactly as they were.
    pub async fn on_order_paid(
        &self,
        event: &OrderPaidEvent,
    ) -> Result<AcquisitionReport, AcquisitionError> {
        let span = tracing::info_span!(
            "acquisition",
            order_id = %event.id,
            customer_id = %event.customer_id,
            items = event.items.len(),
            stage = tracing::field::Empty,
        );

        let started = std::time::Instant::now();
        let result = self.run(event).instrument(span).await;
        AcquisitionMetrics::record_duration(started.elapsed());

        match &result {
            Ok(report) => {
                AcquisitionMetrics::record_committed(report.tickets.len());
                if !report.fully_published() {
                    AcquisitionMetrics::record_unpublished(report.unpublished.len());
                }
            }
            Err(e) => AcquisitionMetrics::record_failure(e.reason()),
        }
        result
    }

    async fn run(&self, event: &OrderPaidEvent) -> Result<AcquisitionReport, AcquisitionError> {
        let deadline = Instant::now() + self.config.timeout;
        enter(Stage::Started);

        if let Err(e) = validate(event) {
            enter(Stage::Rejected);
            tracing::warn!(stage = %Stage::Rejected, error = %e, "Order rejected");
            return Err(e);
        }
        enter(Stage::Validated);

        let mut tx = within(deadline, Stage::Validated, self.store.begin()).await?;

        let mut stage = Stage::Validated;
        let tickets = match self.apply(event, &mut tx, deadline, &mut stage).await {
            Ok(tickets) => tickets,
            Err(e) => {
                self.rollback(tx).await;
                enter(Stage::RolledBack);
                log_failure(stage, &e);
                return Err(e);
            }
        };

        // Not bounded by the deadline: an abandoned commit may still have applied
        if let Err(e) = self.store.commit(tx).await.map_err(AcquisitionError::from) {
            enter(Stage::RolledBack);
            log_failure(Stage::Recorded, &e);
            return Err(e);
        }
        enter(Stage::Committed);
        tracing::info!(tickets = tickets.len(), "Acquisition committed");

        let unpublished = self.publish(&tickets).await;
        enter(Stage::Published);

        Ok(AcquisitionReport {
            order_id: event.id.clone(),
            tickets,
            unpublished,
        })
    }

    /// Lock, mutate and record every item inside `tx`.
    async fn apply(
        &self,
        event: &OrderPaidEvent,
        tx: &mut S::Tx,
        deadline: Instant,
        stage: &mut Stage,
    ) -> Result<Vec<AcquiredTicket>, AcquisitionError> {
        let mut items: Vec<&OrderItem> = event.items.iter().collect();
        items.sort_by(|a, b| a.ticket_stock_id.cmp(&b.ticket_stock_id));

        let mut tickets = Vec::with_capacity(items.len());
        for item in items {
            let store = &self.store;

            let catalog_event = within(
                deadline,
                *stage,
                store.find_event_by_id(&item.event_id, Some(&mut *tx)),
            )
            .await?;
            let show = within(
                deadline,
                *stage,
                store.find_show_by_id(&item.show_id, Some(&mut *tx)),
            )
            .await?;
            let location = within(
                deadline,
                *stage,
                store.find_location_by_show_id(&item.show_id, Some(&mut *tx)),
            )
            .await?;

            let mut stock = within(
                deadline,
                *stage,
                store.lock_for_update(&item.ticket_stock_id, &mut *tx),
            )
            .await?;
            *stage = Stage::Locked;
            enter(Stage::Locked);

            let now = self.clock.now();
            stock.acquire(item.quantity, now, self.config.capacity_policy)?;
            within(
                deadline,
                *stage,
                store.update(&item.ticket_stock_id, &stock, &mut *tx),
            )
            .await?;

            let ticket = AcquiredTicket {
                id: None,
                number: generate_ticket_number(),
                event_id: item.event_id.clone(),
                show_id: item.show_id.clone(),
                tier: stock.tier.clone(),
                ticket_stock_id: item.ticket_stock_id.clone(),
                event_name: catalog_event.name,
                show_venue: show.venue,
                show_type: show.show_type,
                show_country: location.country,
                show_city: location.city,
                show_formatted_address: location.formatted_address,
                show_time: show.time,
                customer_name: event.customer_name.clone(),
                customer_email: event.customer_email.clone(),
                customer_id: event.customer_id,
                created_at: now,
                order_id: event.id.clone(),
            };
            let id = within(deadline, *stage, store.save(&ticket, &mut *tx)).await?;
            *stage = Stage::Recorded;
            enter(Stage::Recorded);

            tracing::debug!(
                ticket_stock_id = %item.ticket_stock_id,
                quantity = item.quantity,
                acquired = stock.acquired,
                allocation = stock.allocation,
                ticket_id = %id,
                "Ticket stock acquired"
            );
            tickets.push(ticket.with_id(id));
        }
        Ok(tickets)
    }

    /// Best-effort rollback; the caller's error is what gets reported.
    async fn rollback(&self, tx: S::Tx) {
        if let Err(e) = self.store.rollback(tx).await {
            tracing::error!(error = %e, "Rollback failed");
        }
    }

    /// Publish every committed ticket, returning the numbers that failed.
    async fn publish(&self, tickets: &[AcquiredTicket]) -> Vec<String> {
        let topic = &self.config.acquired_ticket_topic;
        let mut unpublished = Vec::new();

        for ticket in tickets {
            let outcome = match serde_json::to_vec(ticket) {
                Ok(payload) => self
                    .event_bus
                    .publish(topic, &ticket.number, &payload)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            if let Err(reason) = outcome {
                tracing::warn!(
                    number = %ticket.number,
                    topic = %topic,
                    error = %reason,
                    "Acquired ticket committed but not published"
                );
                unpublished.push(ticket.number.clone());
            }
        }
        unpublished
    }
}

fn enter(stage: Stage) {
    tracing::Span::current().record("stage", stage.as_str());
}

fn log_failure(stage: Stage, e: &AcquisitionError) {
    if e.is_permanent() {
        tracing::warn!(stage = %stage, error = %e, "Acquisition rejected");
    } else {
        tracing::error!(stage = %stage, error = %e, "Acquisition failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticket_stock_core::types::{CustomerId, EventId, ShowId, TicketStockId};

    fn order(items: Vec<OrderItem>) -> OrderPaidEvent {
        OrderPaidEvent {
            id: OrderId::new("ORD-1"),
            customer_name: "Ana".to_string(),
            customer_email: "ana@example.com".to_string(),
            customer_id: CustomerId(7),
            items,
        }
    }

    fn item(quantity: i64) -> OrderItem {
        OrderItem {
            event_id: EventId::new("E1"),
            show_id: ShowId::new("SH1"),
            ticket_stock_id: TicketStockId::new("S1"),
            quantity,
        }
    }

    #[test]
    fn validation_rejects_empty_and_non_positive_orders() {
        assert!(matches!(
            validate(&order(vec![])),
            Err(AcquisitionError::InvalidInput(_))
        ));
        assert!(matches!(
            validate(&order(vec![item(0)])),
            Err(AcquisitionError::InvalidInput(_))
        ));
        assert!(matches!(
            validate(&order(vec![item(2), item(-1)])),
            Err(AcquisitionError::InvalidInput(_))
        ));
        assert!(validate(&order(vec![item(1)])).is_ok());
    }

    #[test]
    fn store_errors_map_to_categories() {
        let not_found: AcquisitionError = StoreError::not_found("show", "SH9").into();
        assert_eq!(
            not_found,
            AcquisitionError::NotFound {
                resource: "show",
                id: "SH9".to_string()
            }
        );
        assert!(not_found.is_permanent());

        let conflict: AcquisitionError = StoreError::Conflict("dup".to_string()).into();
        assert!(!conflict.is_permanent());
        assert_eq!(conflict.reason(), "infrastructure");

        let db: AcquisitionError = StoreError::Database("down".to_string()).into();
        assert!(matches!(db, AcquisitionError::Infrastructure(_)));
    }

    #[test]
    fn timeouts_are_transient() {
        let e = AcquisitionError::Timeout {
            stage: Stage::Locked,
        };
        assert!(!e.is_permanent());
        assert_eq!(e.to_string(), "acquisition timed out while locked");
    }

    #[test]
    fn insufficient_stock_is_permanent() {
        let e = AcquisitionError::from(InsufficientStock {
            stock_id: TicketStockId::new("S1"),
            requested: 3,
            remaining: 1,
        });
        assert!(e.is_permanent());
        assert_eq!(e.reason(), "insufficient_stock");
    }
}
