//! Event intake: settlement only after the use case returned.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use ticket_stock::{
    AcquisitionConfig, AcquisitionService, Disposition, EventConsumer, EventHandler, IntakeError,
    OrderPaidHandler,
};
use ticket_stock_core::event_bus::{Acknowledgement, EventBus};
use ticket_stock_core::types::TicketStockId;
use ticket_stock_testing::{InMemoryEventBus, InMemoryStore, fixtures, test_clock};
use tokio::sync::broadcast;

const ORDER_PAID: &str = "order-paid";
const ACQUIRED: &str = "acquired-ticket";

fn handler(store: &InMemoryStore, bus: &InMemoryEventBus) -> OrderPaidHandler<InMemoryStore> {
    OrderPaidHandler::new(AcquisitionService::new(
        Arc::new(store.clone()),
        Arc::new(bus.clone()),
        Arc::new(test_clock()),
        AcquisitionConfig {
            acquired_ticket_topic: ACQUIRED.to_string(),
            ..AcquisitionConfig::default()
        },
    ))
}

fn seeded() -> (InMemoryStore, InMemoryEventBus) {
    ticket_stock_testing::init_test_tracing();
    let store = InMemoryStore::new();
    fixtures::seed_catalog(&store);
    (store, InMemoryEventBus::new())
}

fn payload(order_id: &str, quantity: i64) -> Vec<u8> {
    let order = fixtures::order_paid(order_id, vec![fixtures::item(fixtures::STOCK_ID, quantity)]);
    serde_json::to_vec(&order).unwrap()
}

fn start_consumer(
    bus: &InMemoryEventBus,
    handler: Arc<dyn EventHandler>,
) -> (broadcast::Sender<()>, tokio::task::JoinHandle<()>) {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let consumer = EventConsumer::new(
        "order-paid",
        vec![ORDER_PAID.to_string()],
        Arc::new(bus.clone()),
        handler,
        shutdown_rx,
    )
    .with_retry_delay(Duration::from_millis(10));
    (shutdown_tx, consumer.spawn())
}

#[tokio::test]
async fn handler_acks_successful_order() {
    let (store, bus) = seeded();
    let disposition = handler(&store, &bus).handle(&payload("ORD-1", 5)).await;

    assert_eq!(disposition, Disposition::Ack);
    assert_eq!(
        store.stock(&TicketStockId::new(fixtures::STOCK_ID)).unwrap().acquired,
        45
    );
}

#[tokio::test]
async fn malformed_payload_is_acked_without_a_transaction() {
    let (store, bus) = seeded();
    let h = handler(&store, &bus);

    let err = h.process(b"{not json").await.unwrap_err();
    assert!(matches!(err, IntakeError::Malformed(_)));
    assert_eq!(h.handle(b"{\"id\": 1}").await, Disposition::Ack);
    assert_eq!(store.begin_count(), 0);
}

#[tokio::test]
async fn permanent_failures_are_acked() {
    let (store, bus) = seeded();
    let h = handler(&store, &bus);

    assert_eq!(h.handle(&payload("ORD-EMPTY", 0)).await, Disposition::Ack);
    assert_eq!(h.handle(&payload("ORD-BIG", 500)).await, Disposition::Ack);

    let mut missing = fixtures::order_paid("ORD-404", vec![fixtures::item("S-404", 1)]);
    missing.customer_id = ticket_stock_core::types::CustomerId(9);
    assert_eq!(
        h.handle(&serde_json::to_vec(&missing).unwrap()).await,
        Disposition::Ack
    );
}

#[tokio::test]
async fn infrastructure_failure_is_retried() {
    let (store, bus) = seeded();
    store.fail_commit(true);

    let disposition = handler(&store, &bus).handle(&payload("ORD-R", 1)).await;
    assert_eq!(disposition, Disposition::Retry);
}

#[tokio::test]
async fn unpublished_tickets_still_ack() {
    let (store, bus) = seeded();
    bus.fail_publish(true);

    let disposition = handler(&store, &bus).handle(&payload("ORD-W", 1)).await;
    assert_eq!(disposition, Disposition::Ack);
    assert_eq!(store.acquired_tickets().len(), 1);
}

#[tokio::test]
async fn consumer_acks_and_nacks_by_outcome() {
    let (store, bus) = seeded();
    bus.publish(ORDER_PAID, "ORD-1", &payload("ORD-1", 5))
        .await
        .unwrap();
    bus.publish(ORDER_PAID, "ORD-2", b"garbage").await.unwrap();

    let (shutdown, handle) = start_consumer(&bus, Arc::new(handler(&store, &bus)));

    let settled = bus.wait_for_settlements(2, Duration::from_secs(2)).await;
    assert_eq!(settled.len(), 2);
    assert_eq!(settled[0].key.as_deref(), Some("ORD-1"));
    assert_eq!(settled[0].outcome, Some(Acknowledgement::Ack));
    assert_eq!(settled[1].outcome, Some(Acknowledgement::Ack));

    store.fail_commit(true);
    bus.publish(ORDER_PAID, "ORD-3", &payload("ORD-3", 1))
        .await
        .unwrap();
    let settled = bus.wait_for_settlements(3, Duration::from_secs(2)).await;
    assert_eq!(settled[2].outcome, Some(Acknowledgement::Nack));

    shutdown.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bus.published_to(ACQUIRED).len(), 1);
}

#[tokio::test]
async fn slow_commit_is_acked_and_counted_once() {
    let (store, bus) = seeded();
    store.delay_commits(Some(Duration::from_millis(200)));
    let handler = OrderPaidHandler::new(AcquisitionService::new(
        Arc::new(store.clone()),
        Arc::new(bus.clone()),
        Arc::new(test_clock()),
        AcquisitionConfig {
            timeout: Duration::from_millis(50),
            acquired_ticket_topic: ACQUIRED.to_string(),
            ..AcquisitionConfig::default()
        },
    ));
    bus.publish(ORDER_PAID, "ORD-SLOW", &payload("ORD-SLOW", 5))
        .await
        .unwrap();

    let (shutdown, handle) = start_consumer(&bus, Arc::new(handler));

    let settled = bus.wait_for_settlements(1, Duration::from_secs(2)).await;
    assert_eq!(settled[0].outcome, Some(Acknowledgement::Ack));

    shutdown.send(()).unwrap();
    handle.await.unwrap();
    assert_eq!(bus.settlements().len(), 1);
    assert_eq!(store.commit_count(), 1);
    assert_eq!(
        store.stock(&TicketStockId::new(fixtures::STOCK_ID)).unwrap().acquired,
        45
    );
    assert_eq!(store.acquired_tickets().len(), 1);
}

/// Holds every delivery until released, recording whether it has finished.
struct GatedHandler {
    gate: tokio::sync::Semaphore,
    finished: AtomicBool,
}

#[async_trait]
impl EventHandler for GatedHandler {
    async fn handle(&self, _payload: &[u8]) -> Disposition {
        let _permit = self.gate.acquire().await.unwrap();
        self.finished.store(true, Ordering::SeqCst);
        Disposition::Ack
    }
}

#[tokio::test]
async fn delivery_is_settled_only_after_handler_returns() {
    let bus = InMemoryEventBus::new();
    bus.publish(ORDER_PAID, "ORD-1", b"{}").await.unwrap();

    let gated = Arc::new(GatedHandler {
        gate: tokio::sync::Semaphore::new(0),
        finished: AtomicBool::new(false),
    });
    let (shutdown, handle) = start_consumer(&bus, gated.clone());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(bus.settlements().is_empty());
    assert!(!gated.finished.load(Ordering::SeqCst));

    gated.gate.add_permits(1);
    let settled = bus.wait_for_settlements(1, Duration::from_secs(2)).await;
    assert!(gated.finished.load(Ordering::SeqCst));
    assert_eq!(settled[0].outcome, Some(Acknowledgement::Ack));

    shutdown.send(()).unwrap();
    handle.await.unwrap();
}

struct PanickingHandler;

#[async_trait]
impl EventHandler for PanickingHandler {
    async fn handle(&self, payload: &[u8]) -> Disposition {
        assert!(payload.is_empty(), "handler blew up");
        Disposition::Ack
    }
}

#[tokio::test]
async fn panicking_handler_nacks_and_consumer_keeps_going() {
    let bus = InMemoryEventBus::new();
    bus.publish(ORDER_PAID, "BAD", b"x").await.unwrap();
    bus.publish(ORDER_PAID, "GOOD", b"").await.unwrap();

    let (shutdown, handle) = start_consumer(&bus, Arc::new(PanickingHandler));

    let settled = bus.wait_for_settlements(2, Duration::from_secs(2)).await;
    assert_eq!(settled[0].outcome, Some(Acknowledgement::Nack));
    assert_eq!(settled[1].outcome, Some(Acknowledgement::Ack));

    shutdown.send(()).unwrap();
    handle.await.unwrap();
}
