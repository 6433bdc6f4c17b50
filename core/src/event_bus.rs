//! Event bus abstraction for the inbound "order paid" and outbound "ticket acquired" facts.
//!
//! This module provides the [`EventBus`] trait for keyed publishing and for subscribing
//! with explicit acknowledgement.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  order-paid     │
//! │  topic          │
//! └────────┬────────┘
//!          │ Delivery
//!          ▼
//! ┌─────────────────┐
//! │  Event Intake   │──► Acquisition (commit to Postgres)
//! └────────┬────────┘
//!          │ ack / nack, only after the use case returns
//!          ▼
//! ┌─────────────────┐
//! │ acquired-ticket │◄─── publish(topic, key = ticket number, JSON)
//! │  topic          │
//! └─────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - **Postgres first**: the acquisition commits before anything is published
//! - **Keyed publish**: messages with the same key land on the same partition, so
//!   consumers keyed on ticket number see them in order
//! - **Acknowledge after processing**: a [`Delivery`] is settled by the consumer once
//!   its handler has returned; an unsettled delivery is never committed
//!
//! # Implementations
//!
//! - `InMemoryEventBus` (in `ticket-stock-testing`) - for tests
//! - `RedpandaEventBus` (in `ticket-stock-redpanda`) - for production (Kafka-compatible)

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// A received message could not be read
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// How a consumer settled a [`Delivery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Processing finished (successfully or permanently failed); commit the offset.
    Ack,
    /// Processing failed transiently; leave the offset and have the bus redeliver.
    Nack,
}

/// A message handed to a subscriber.
///
/// The bus waits for the subscriber to call [`Delivery::ack`] or [`Delivery::nack`].
/// Dropping a delivery without settling it leaves its offset uncommitted.
#[derive(Debug)]
pub struct Delivery {
    /// Topic the message was read from
    pub topic: String,
    /// Partitioning key, if the producer set one
    pub key: Option<String>,
    /// Raw payload
    pub payload: Vec<u8>,
    responder: Option<oneshot::Sender<Acknowledgement>>,
}

impl Delivery {
    /// Create a delivery together with the receiver the bus waits on for settlement.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        key: Option<String>,
        payload: Vec<u8>,
    ) -> (Self, oneshot::Receiver<Acknowledgement>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                topic: topic.into(),
                key,
                payload,
                responder: Some(tx),
            },
            rx,
        )
    }

    /// Mark the message as processed.
    pub fn ack(self) {
        self.settle(Acknowledgement::Ack);
    }

    /// Ask the bus to redeliver the message.
    pub fn nack(self) {
        self.settle(Acknowledgement::Nack);
    }

    fn settle(mut self, ack: Acknowledgement) {
        if let Some(responder) = self.responder.take() {
            // The bus may already have gone away (shutdown); nothing left to tell.
            let _ = responder.send(ack);
        }
    }
}

/// Stream of deliveries from a subscription.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn EventBus>`).
pub trait EventBus: Send + Sync {
    /// Publish `payload` to `topic` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker does not accept the message.
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics.
    ///
    /// The returned stream yields one [`Delivery`] at a time; the next message of the
    /// same partition is only handed out after the previous one has been settled.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>>;
}
