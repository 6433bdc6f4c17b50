//! Event intake: consume "order paid" messages and drive the acquisition.
//!
//! [`EventConsumer`] owns the subscribe-process-reconnect loop. For every
//! delivery it runs the [`EventHandler`] on its own task, waits for it to
//! return, and only then acks or nacks the delivery:
//!
//! ```text
//! loop {
//!     subscribe(topics)
//!     for delivery in stream {
//!         disposition = spawn(handler.handle(payload)).await
//!         Ack   → delivery.ack()    (offset committed)
//!         Retry → delivery.nack()   (bus redelivers)
//!     }
//!     stream ended / subscribe failed → sleep(retry_delay)
//! }
//! ```
//!
//! A shutdown signal is honoured between deliveries, never in the middle of one.

use crate::acquisition::{AcquisitionError, AcquisitionReport, AcquisitionService};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use ticket_stock_core::event_bus::{DeliveryStream, EventBus};
use ticket_stock_core::store::{
    AcquisitionRecorder, CatalogLookup, StockLedger, TransactionCoordinator,
};
use ticket_stock_core::types::OrderPaidEvent;
use ticket_stock_runtime::metrics::IntakeMetrics;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// What the consumer should do with a delivery once its handler returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Done with it, successfully or permanently failed: commit the offset.
    Ack,
    /// Transient failure: have the bus deliver it again.
    Retry,
}

impl Disposition {
    /// Metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Retry => "retry",
        }
    }
}

/// Failures while handling one inbound message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntakeError {
    /// The payload is not a valid order-paid event.
    #[error("malformed order-paid payload: {0}")]
    Malformed(String),

    /// The acquisition failed.
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
}

impl IntakeError {
    /// Ack permanent failures, retry the rest.
    #[must_use]
    pub const fn disposition(&self) -> Disposition {
        match self {
            Self::Malformed(_) => Disposition::Ack,
            Self::Acquisition(e) if e.is_permanent() => Disposition::Ack,
            Self::Acquisition(_) => Disposition::Retry,
        }
    }
}

/// Processes the raw payload of one delivery.
///
/// Implementors must be `Send + Sync + 'static`: a handler is shared by the
/// consumer and every per-delivery task.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handle one payload and say how the delivery should be settled.
    async fn handle(&self, payload: &[u8]) -> Disposition;
}

/// Decodes order-paid payloads and runs the acquisition.
pub struct OrderPaidHandler<S> {
    service: AcquisitionService<S>,
}

impl<S> OrderPaidHandler<S>
where
    S: TransactionCoordinator
        + StockLedger<S::Tx>
        + CatalogLookup<S::Tx>
        + AcquisitionRecorder<S::Tx>
        + 'static,
{
    /// Wrap the use case.
    #[must_use]
    pub const fn new(service: AcquisitionService<S>) -> Self {
        Self { service }
    }

    /// Decode `payload` and run the acquisition.
    ///
    /// # Errors
    ///
    /// - [`IntakeError::Malformed`] if the payload does not decode; the use case
    ///   is not called
    /// - [`IntakeError::Acquisition`] if the use case fails
    pub async fn process(&self, payload: &[u8]) -> Result<AcquisitionReport, IntakeError> {
        let event: OrderPaidEvent =
            serde_json::from_slice(payload).map_err(|e| IntakeError::Malformed(e.to_string()))?;
        Ok(self.service.on_order_paid(&event).await?)
    }
}

#[async_trait]
impl<S> EventHandler for OrderPaidHandler<S>
where
    S: TransactionCoordinator
        + StockLedger<S::Tx>
        + CatalogLookup<S::Tx>
        + AcquisitionRecorder<S::Tx>
        + 'static,
{
    #[tracing::instrument(skip_all, fields(bytes = payload.len()))]
    async fn handle(&self, payload: &[u8]) -> Disposition {
        match self.process(payload).await {
            Ok(report) => {
                if report.fully_published() {
                    info!(order_id = %report.order_id, tickets = report.tickets.len(), "Order fulfilled");
                } else {
                    warn!(
                        order_id = %report.order_id,
                        tickets = report.tickets.len(),
                        unpublished = ?report.unpublished,
                        "Order fulfilled with unpublished tickets"
                    );
                }
                Disposition::Ack
            }
            Err(e) => {
                let disposition = e.disposition();
                match disposition {
                    Disposition::Ack => warn!(error = %e, "Order dropped"),
                    Disposition::Retry => error!(error = %e, "Order will be redelivered"),
                }
                disposition
            }
        }
    }
}

/// Subscribe-process-reconnect loop over one set of topics.
///
/// # Lifecycle
///
/// 1. Created with [`EventConsumer::new`]
/// 2. Spawned via [`EventConsumer::spawn`]
/// 3. Runs until the shutdown signal fires
pub struct EventConsumer {
    /// Consumer name (for logging)
    name: String,
    /// Topics to subscribe to
    topics: Vec<String>,
    /// Event bus to consume from
    event_bus: Arc<dyn EventBus>,
    /// Handler for every delivery
    handler: Arc<dyn EventHandler>,
    /// Shutdown signal receiver
    shutdown: broadcast::Receiver<()>,
    /// Pause before resubscribing (default: 5 seconds)
    retry_delay: Duration,
}

impl EventConsumer {
    /// Create a consumer with the default retry delay.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        topics: Vec<String>,
        event_bus: Arc<dyn EventBus>,
        handler: Arc<dyn EventHandler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            name: name.into(),
            topics,
            event_bus,
            handler,
            shutdown,
            retry_delay: Duration::from_secs(5),
        }
    }

    /// Set custom retry delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Spawn the consumer as a background task.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(consumer = %self.name, "Event consumer started");

        loop {
            let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();

            let subscribed = tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Event consumer received shutdown signal");
                    break;
                }
                result = self.event_bus.subscribe(&topics) => result,
            };

            match subscribed {
                Ok(mut stream) => {
                    info!(consumer = %self.name, topics = ?self.topics, "Subscribed to event bus");
                    if self.process_stream(&mut stream).await {
                        break;
                    }
                    warn!(consumer = %self.name, "Event stream ended, reconnecting in {:?}", self.retry_delay);
                }
                Err(e) => {
                    error!(
                        consumer = %self.name,
                        error = %e,
                        "Failed to subscribe to event bus, retrying in {:?}",
                        self.retry_delay
                    );
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Event consumer received shutdown signal");
                    break;
                }
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        info!(consumer = %self.name, "Event consumer stopped");
    }

    /// Drain `stream`, returning `true` when stopped by the shutdown signal.
    async fn process_stream(&mut self, stream: &mut DeliveryStream) -> bool {
        loop {
            let next = tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Event consumer received shutdown signal during processing");
                    return true;
                }
                next = stream.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    error!(consumer = %self.name, error = %e, "Error receiving message from stream");
                    continue;
                }
                None => return false,
            };

            let handler = Arc::clone(&self.handler);
            let payload = delivery.payload.clone();
            let disposition = match tokio::spawn(async move { handler.handle(&payload).await }).await
            {
                Ok(disposition) => disposition,
                Err(e) => {
                    error!(consumer = %self.name, error = %e, "Handler task failed");
                    Disposition::Retry
                }
            };

            IntakeMetrics::record_settled(disposition.as_str());
            match disposition {
                Disposition::Ack => delivery.ack(),
                Disposition::Retry => delivery.nack(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::Stage;

    #[test]
    fn permanent_failures_are_acked() {
        assert_eq!(
            IntakeError::Malformed("eof".to_string()).disposition(),
            Disposition::Ack
        );
        assert_eq!(
            IntakeError::from(AcquisitionError::InvalidInput("no items".to_string())).disposition(),
            Disposition::Ack
        );
        assert_eq!(
            IntakeError::from(AcquisitionError::NotFound {
                resource: "show",
                id: "SH9".to_string()
            })
            .disposition(),
            Disposition::Ack
        );
    }

    #[test]
    fn transient_failures_are_retried() {
        assert_eq!(
            IntakeError::from(AcquisitionError::Infrastructure("down".to_string())).disposition(),
            Disposition::Retry
        );
        assert_eq!(
            IntakeError::from(AcquisitionError::Timeout {
                stage: Stage::Locked
            })
            .disposition(),
            Disposition::Retry
        );
    }
}
