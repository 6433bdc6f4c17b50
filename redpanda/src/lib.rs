//! Redpanda event bus for the ticket-stock service.
//!
//! This crate provides a Redpanda-based event bus that implements the
//! [`EventBus`] trait from `ticket-stock-core`. It uses rdkafka, so any
//! Kafka-compatible broker works.
//!
//! # Architecture
//!
//! ```text
//!   order-paid topic                       acquired-ticket topic
//!        │                                          ▲
//!        ▼                                          │ key = ticket number
//! ┌─────────────────┐   Delivery   ┌──────────────┐ │
//! │ consumer task   │─────────────►│ Event Intake │─┘
//! │ (StreamConsumer)│◄─────────────│              │
//! └─────────────────┘  ack / nack  └──────────────┘
//!   ack  → commit offset
//!   nack → seek back to the message, redeliver
//! ```
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - A message's offset is committed only after the subscriber acks it
//! - A nack seeks the partition back so the same message is read again
//! - A delivery dropped without a decision is neither committed nor replayed
//!   until the consumer restarts or rebalances
//! - The consumer task hands out one message at a time, so ordering within a
//!   partition is preserved
//!
//! # Example
//!
//! ```no_run
//! use ticket_stock_redpanda::RedpandaEventBus;
//! use ticket_stock_core::event_bus::EventBus;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::new("localhost:9092")?;
//!
//! event_bus.publish("acquired-ticket", "K7Q2...", br#"{"number":"K7Q2..."}"#).await?;
//!
//! let mut stream = event_bus.subscribe(&["order-paid"]).await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(delivery) => delivery.ack(),
//!         Err(e) => eprintln!("Error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use rdkafka::Offset;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use ticket_stock_core::event_bus::{
    Acknowledgement, Delivery, DeliveryStream, EventBus, EventBusError,
};

/// Redpanda event bus implementation.
///
/// # Configuration
///
/// The event bus can be configured with:
/// - **Broker addresses**: Bootstrap servers (required)
/// - **Producer settings**: Acks, compression, timeout
/// - **Consumer group**: Explicit ID or auto-generated from topics
/// - **Offset reset**: Where new groups start reading (default: "latest")
/// - **Nack backoff**: Pause before a nacked message is read again (default: 1s)
///
/// # Example
///
/// ```no_run
/// use ticket_stock_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .consumer_group("ticket-stock")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    /// Kafka producer for publishing messages
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Producer timeout
    timeout: Duration,
    /// Consumer group ID (if explicitly set)
    consumer_group: Option<String>,
    /// Auto offset reset policy
    auto_offset_reset: String,
    /// Pause before re-reading a nacked message
    nack_backoff: Duration,
}

impl RedpandaEventBus {
    /// Create a new Redpanda event bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    auto_offset_reset: Option<String>,
    nack_backoff: Option<Duration>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated, e.g. "localhost:9092").
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: "0", "1" or "all".
    ///
    /// Default: "all"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4", "zstd".
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer group ID for subscriptions.
    ///
    /// Service instances sharing a group split the partitions between them.
    /// If not set, the group is derived from the subscribed topics.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set where a new consumer group starts reading: "earliest", "latest" or "error".
    ///
    /// Default: "latest"
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Set the pause before a nacked message is read again.
    ///
    /// Default: 1 second
    #[must_use]
    pub const fn nack_backoff(mut self, backoff: Duration) -> Self {
        self.nack_backoff = Some(backoff);
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if:
    /// - Brokers not set
    /// - Cannot create producer
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self.brokers.ok_or_else(|| {
            EventBusError::ConnectionFailed("Brokers not configured".to_string())
        })?;

        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            auto_offset_reset = self.auto_offset_reset.as_deref().unwrap_or("latest"),
            "RedpandaEventBus created successfully"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            consumer_group: self.consumer_group,
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| "latest".to_string()),
            nack_backoff: self.nack_backoff.unwrap_or(Duration::from_secs(1)),
        })
    }
}

fn group_for(topics: &[String]) -> String {
    let mut sorted = topics.to_vec();
    sorted.sort();
    format!("ticket-stock-{}", sorted.join("-"))
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let key = key.to_string();
        let payload = payload.to_vec();
        let timeout = self.timeout;

        Box::pin(async move {
            // Same key, same partition: per-ticket ordering for downstream consumers
            let record = FutureRecord::to(&topic).payload(&payload).key(&key);

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        key = %key,
                        partition,
                        offset,
                        "Message published successfully"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        key = %key,
                        error = %kafka_error,
                        "Failed to publish message"
                    );
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    #[allow(clippy::too_many_lines)] // Settlement handling keeps commit and seek next to the read
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let brokers = self.brokers.clone();
        let consumer_group = self.consumer_group.clone();
        let auto_offset_reset = self.auto_offset_reset.clone();
        let nack_backoff = self.nack_backoff;

        Box::pin(async move {
            let consumer_group_id = consumer_group.unwrap_or_else(|| group_for(&topics));

            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", &consumer_group_id)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %consumer_group_id,
                auto_offset_reset = %auto_offset_reset,
                manual_commit = true,
                "Subscribed to topics"
            );

            // Capacity 1: the next message is only read after the previous one is settled
            let (tx, rx) = tokio::sync::mpsc::channel(1);

            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = consumer.stream();

                while let Some(msg_result) = stream.next().await {
                    let message = match msg_result {
                        Ok(message) => message,
                        Err(e) => {
                            let err = EventBusError::TransportError(format!(
                                "Failed to receive message: {e}"
                            ));
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                            continue;
                        }
                    };

                    let Some(payload) = message.payload() else {
                        let err =
                            EventBusError::DeserializationFailed("Message has no payload".to_string());
                        if tx.send(Err(err)).await.is_err() {
                            break;
                        }
                        // Nothing to process, never worth redelivering
                        if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                            tracing::warn!(error = %e, "Failed to commit message with no payload");
                        }
                        continue;
                    };

                    let key = message
                        .key()
                        .map(|k| String::from_utf8_lossy(k).into_owned());
                    let (delivery, settled) =
                        Delivery::new(message.topic(), key, payload.to_vec());

                    tracing::trace!(
                        topic = message.topic(),
                        partition = message.partition(),
                        offset = message.offset(),
                        "Received message"
                    );

                    if tx.send(Ok(delivery)).await.is_err() {
                        tracing::debug!("Delivery receiver dropped, exiting consumer task");
                        break;
                    }

                    match settled.await {
                        Ok(Acknowledgement::Ack) => {
                            if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                tracing::warn!(
                                    topic = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    error = %e,
                                    "Failed to commit offset (message may be redelivered)"
                                );
                            }
                        }
                        Ok(Acknowledgement::Nack) => {
                            tokio::time::sleep(nack_backoff).await;
                            if let Err(e) = consumer.seek(
                                message.topic(),
                                message.partition(),
                                Offset::Offset(message.offset()),
                                Timeout::After(Duration::from_secs(5)),
                            ) {
                                tracing::error!(
                                    topic = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    error = %e,
                                    "Failed to seek back after nack"
                                );
                            }
                        }
                        Err(_) => {
                            tracing::warn!(
                                topic = message.topic(),
                                partition = message.partition(),
                                offset = message.offset(),
                                "Delivery dropped without acknowledgement, offset left uncommitted"
                            );
                        }
                    }
                }

                tracing::debug!("Consumer task exiting");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redpanda_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaEventBus>();
        assert_sync::<RedpandaEventBus>();
    }

    #[test]
    fn build_without_brokers_fails() {
        let err = RedpandaEventBus::builder().build().err();
        assert!(matches!(err, Some(EventBusError::ConnectionFailed(_))));
    }

    #[test]
    fn derived_group_is_stable_across_topic_order() {
        let a = group_for(&["order-paid".to_string(), "b".to_string()]);
        let b = group_for(&["b".to_string(), "order-paid".to_string()]);
        assert_eq!(a, b);
        assert_eq!(a, "ticket-stock-b-order-paid");
    }
}
