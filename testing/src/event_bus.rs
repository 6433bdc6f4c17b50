//! In-memory event bus.
//!
//! Publishing records the message and forwards it to every live subscriber of
//! its topic. A new subscription first replays what was already published on
//! its topics, like a Kafka consumer starting from the earliest offset.
//!
//! Each subscriber sees one delivery at a time: the stream only moves on after
//! the previous [`Delivery`] was settled (or dropped), and the outcome is kept
//! in [`InMemoryEventBus::settlements`] as soon as it is known. Nacked messages
//! are recorded, not redelivered.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use ticket_stock_core::event_bus::{
    Acknowledgement, Delivery, DeliveryStream, EventBus, EventBusError,
};
use tokio::sync::mpsc;

/// A message accepted by [`InMemoryEventBus::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Destination topic
    pub topic: String,
    /// Partitioning key
    pub key: String,
    /// Raw payload
    pub payload: Vec<u8>,
}

/// How a subscriber settled one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// Topic the delivery came from
    pub topic: String,
    /// Key of the delivered message
    pub key: Option<String>,
    /// `None` when the delivery was dropped without a decision
    pub outcome: Option<Acknowledgement>,
}

struct Subscriber {
    topics: Vec<String>,
    sender: mpsc::UnboundedSender<PublishedMessage>,
}

#[derive(Default)]
struct Inner {
    published: RwLock<Vec<PublishedMessage>>,
    subscribers: Mutex<Vec<Subscriber>>,
    settlements: Mutex<Vec<Settlement>>,
    fail_publish: AtomicBool,
}

/// In-memory [`EventBus`] for tests.
///
/// # Example
///
/// ```
/// use ticket_stock_testing::InMemoryEventBus;
/// use ticket_stock_core::event_bus::EventBus;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryEventBus::new();
/// bus.publish("ticket-acquired", "ABC", b"{}").await?;
/// assert_eq!(bus.published_to("ticket-acquired").len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("published", &self.published().len())
            .finish_non_exhaustive()
    }
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message published so far.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.inner.published.read().unwrap().clone()
    }

    /// Messages published to one topic.
    #[must_use]
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.topic == topic)
            .collect()
    }

    /// Settlements recorded so far, in delivery order.
    #[must_use]
    pub fn settlements(&self) -> Vec<Settlement> {
        self.inner.settlements.lock().unwrap().clone()
    }

    /// Poll until at least `count` settlements were recorded or `within` elapsed.
    pub async fn wait_for_settlements(&self, count: usize, within: Duration) -> Vec<Settlement> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let settled = self.settlements();
            if settled.len() >= count || tokio::time::Instant::now() >= deadline {
                return settled;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Make every subsequent publish fail.
    pub fn fail_publish(&self, fail: bool) {
        self.inner.fail_publish.store(fail, Ordering::SeqCst);
    }

    fn record_settlement(&self, settlement: Settlement) {
        self.inner.settlements.lock().unwrap().push(settlement);
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let message = PublishedMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_vec(),
        };

        Box::pin(async move {
            if self.inner.fail_publish.load(Ordering::SeqCst) {
                return Err(EventBusError::PublishFailed {
                    topic: message.topic,
                    reason: "injected publish failure".to_string(),
                });
            }

            let mut published = self.inner.published.write().unwrap();
            let mut subscribers = self.inner.subscribers.lock().unwrap();
            subscribers.retain(|s| !s.sender.is_closed());
            for subscriber in subscribers.iter() {
                if subscriber.topics.contains(&message.topic) {
                    let _ = subscriber.sender.send(message.clone());
                }
            }
            published.push(message);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|t| (*t).to_string()).collect();

        Box::pin(async move {
            let (sender, mut receiver) = mpsc::unbounded_channel();
            {
                let published = self.inner.published.read().unwrap();
                for message in published.iter().filter(|m| topics.contains(&m.topic)) {
                    let _ = sender.send(message.clone());
                }
                self.inner
                    .subscribers
                    .lock()
                    .unwrap()
                    .push(Subscriber { topics, sender });
            }

            let bus = self.clone();
            let stream = async_stream::stream! {
                while let Some(PublishedMessage { topic, key, payload }) = receiver.recv().await {
                    let (delivery, settled) = Delivery::new(topic.clone(), Some(key.clone()), payload);
                    let (recorded, done) = tokio::sync::oneshot::channel::<()>();
                    let recorder = bus.clone();
                    tokio::spawn(async move {
                        let outcome = settled.await.ok();
                        recorder.record_settlement(Settlement {
                            topic,
                            key: Some(key),
                            outcome,
                        });
                        let _ = recorded.send(());
                    });
                    yield Ok::<_, EventBusError>(delivery);
                    let _ = done.await;
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn publish_records_key_and_payload() {
        let bus = InMemoryEventBus::new();
        bus.publish("ticket-acquired", "K1", b"payload").await.unwrap();

        let sent = bus.published();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].key, "K1");
        assert_eq!(sent[0].payload, b"payload");
    }

    #[tokio::test]
    async fn failing_publish_records_nothing() {
        let bus = InMemoryEventBus::new();
        bus.fail_publish(true);
        let err = bus.publish("ticket-acquired", "K1", b"{}").await.unwrap_err();
        assert!(matches!(err, EventBusError::PublishFailed { .. }));
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn subscription_replays_and_records_settlements() {
        let bus = InMemoryEventBus::new();
        bus.publish("order-paid", "O1", b"one").await.unwrap();
        bus.publish("other", "X", b"ignored").await.unwrap();

        let mut stream = bus.subscribe(&["order-paid"]).await.unwrap();
        bus.publish("order-paid", "O2", b"two").await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.payload, b"one");
        first.ack();

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.key.as_deref(), Some("O2"));
        second.nack();

        let settled = bus.wait_for_settlements(2, Duration::from_secs(1)).await;
        let outcomes: Vec<_> = settled.iter().map(|s| s.outcome).collect();
        assert_eq!(
            outcomes,
            vec![Some(Acknowledgement::Ack), Some(Acknowledgement::Nack)]
        );
    }
}
