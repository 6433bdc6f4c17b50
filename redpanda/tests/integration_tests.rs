//! Integration tests for [`RedpandaEventBus`] with a real Kafka instance.
//!
//! These tests use testcontainers to spin up Kafka and validate:
//! - Keyed publish/subscribe round-trip
//! - Acked messages are not seen again by the same consumer group
//! - Nacked messages are redelivered
//!
//! # Running These Tests
//!
//! Marked `#[ignore]` because they need Docker and take a while to start Kafka:
//! ```bash
//! cargo test -p ticket-stock-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use futures::StreamExt;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};
use ticket_stock_core::event_bus::{Delivery, DeliveryStream, EventBus};
use ticket_stock_redpanda::RedpandaEventBus;

const WARMUP: &[u8] = b"warmup";

/// Start Kafka and wait until it accepts publishes.
async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    let brokers = format!("{host}:{port}");

    let max_attempts = 60;
    for attempt in 1..=max_attempts {
        if let Ok(bus) = RedpandaEventBus::new(&brokers) {
            if bus.publish("warmup-topic", "warmup", WARMUP).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(500)).await;
                return (kafka, brokers);
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(
            attempt != max_attempts,
            "Kafka failed to become ready after {max_attempts} attempts"
        );
    }
    unreachable!("readiness loop either returns or panics");
}

/// Publish a warmup message so the topic is auto-created before subscribing.
async fn ensure_topic_exists(event_bus: &RedpandaEventBus, topic: &str) {
    for attempt in 1..=30 {
        if event_bus.publish(topic, "warmup", WARMUP).await.is_ok() {
            tokio::time::sleep(Duration::from_secs(3)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(attempt != 30, "Failed to create topic {topic}");
    }
}

/// Next non-warmup delivery; warmups are acked out of the way.
async fn next_delivery(stream: &mut DeliveryStream) -> Delivery {
    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            let delivery = stream
                .next()
                .await
                .expect("stream ended")
                .expect("Failed to receive message");
            if delivery.payload == WARMUP {
                delivery.ack();
                continue;
            }
            return delivery;
        }
    })
    .await
    .expect("Timeout waiting for message")
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn keyed_publish_round_trips_key_and_payload() {
    let (_kafka, brokers) = start_kafka().await;
    let event_bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .consumer_group("round-trip")
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus");
    ensure_topic_exists(&event_bus, "acquired-ticket").await;

    let mut stream = event_bus
        .subscribe(&["acquired-ticket"])
        .await
        .expect("Failed to subscribe");

    let payload = serde_json::to_vec(&serde_json::json!({"number": "ABCDEFGHIJ0123456789"}))
        .expect("serialize");
    event_bus
        .publish("acquired-ticket", "ABCDEFGHIJ0123456789", &payload)
        .await
        .expect("Failed to publish");

    let delivery = next_delivery(&mut stream).await;
    assert_eq!(delivery.topic, "acquired-ticket");
    assert_eq!(delivery.key.as_deref(), Some("ABCDEFGHIJ0123456789"));
    assert_eq!(delivery.payload, payload);
    delivery.ack();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn acked_message_is_not_redelivered_to_the_group() {
    let (_kafka, brokers) = start_kafka().await;
    let event_bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .consumer_group("ack-commit")
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus");
    ensure_topic_exists(&event_bus, "order-paid-ack").await;

    event_bus
        .publish("order-paid-ack", "ORD-1", b"first")
        .await
        .expect("publish first");

    {
        let mut stream = event_bus
            .subscribe(&["order-paid-ack"])
            .await
            .expect("Failed to subscribe");
        let delivery = next_delivery(&mut stream).await;
        assert_eq!(delivery.payload, b"first");
        delivery.ack();
        // Let the async commit reach the broker before the consumer goes away
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    event_bus
        .publish("order-paid-ack", "ORD-2", b"second")
        .await
        .expect("publish second");

    let mut stream = event_bus
        .subscribe(&["order-paid-ack"])
        .await
        .expect("Failed to resubscribe");
    let delivery = next_delivery(&mut stream).await;
    assert_eq!(delivery.payload, b"second");
    delivery.ack();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn nacked_message_is_redelivered() {
    let (_kafka, brokers) = start_kafka().await;
    let event_bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .consumer_group("nack-redeliver")
        .auto_offset_reset("earliest")
        .nack_backoff(Duration::from_millis(100))
        .build()
        .expect("Failed to create event bus");
    ensure_topic_exists(&event_bus, "order-paid-nack").await;

    let mut stream = event_bus
        .subscribe(&["order-paid-nack"])
        .await
        .expect("Failed to subscribe");

    event_bus
        .publish("order-paid-nack", "ORD-1", b"retry me")
        .await
        .expect("publish");

    let first = next_delivery(&mut stream).await;
    assert_eq!(first.payload, b"retry me");
    first.nack();

    let again = next_delivery(&mut stream).await;
    assert_eq!(again.payload, b"retry me");
    assert_eq!(again.key.as_deref(), Some("ORD-1"));
    again.ack();
}
