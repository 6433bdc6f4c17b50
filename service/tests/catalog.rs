//! Catalog read aggregator against the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;
use ticket_stock::{ApiError, CatalogError, CatalogQueries, Config};
use ticket_stock_core::store::{AcquisitionRecorder, TransactionCoordinator};
use ticket_stock_core::types::{CustomerId, EventId, ShowId};
use ticket_stock_testing::{InMemoryStore, fixtures};

fn seeded() -> InMemoryStore {
    let store = InMemoryStore::new();
    fixtures::seed_catalog(&store);
    for id in ["E2", "E3"] {
        store.insert_event(fixtures::event(id));
    }
    store
}

fn queries(store: &InMemoryStore) -> CatalogQueries {
    CatalogQueries::new(Arc::new(store.clone()), Duration::from_secs(2))
}

async fn record_tickets(store: &InMemoryStore, customer: i64, count: usize) {
    let mut tx = store.begin().await.unwrap();
    for n in 0..count {
        let number = format!("C{customer}N{n:017}");
        store
            .save(&fixtures::acquired_ticket(&number, customer), &mut tx)
            .await
            .unwrap();
    }
    store.commit(tx).await.unwrap();
}

#[tokio::test]
async fn events_page_carries_total_and_details() {
    let store = seeded();
    let page = queries(&store).get_many_events(1, 2).await.unwrap();

    assert_eq!(page.total, 3);
    let ids: Vec<&str> = page.events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["E3", "E2"]);

    let page = queries(&store).get_many_events(2, 2).await.unwrap();
    assert_eq!(page.events.len(), 1);
    let e1 = &page.events[0];
    assert_eq!(e1.id.as_str(), fixtures::EVENT_ID);
    assert_eq!(e1.artists[0].name, "Sheila on 7");
    assert_eq!(e1.promotors[0].name, "Java Festival");
}

#[tokio::test]
async fn repeated_page_read_is_identical() {
    let store = seeded();
    let catalog = queries(&store);

    let first = catalog.get_many_events(1, 10).await.unwrap();
    let second = catalog.get_many_events(1, 10).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn page_below_one_is_rejected() {
    let store = seeded();
    let err = queries(&store).get_many_events(0, 10).await.unwrap_err();
    assert_eq!(err, CatalogError::InvalidPage { page: 0, size: 10 });

    let err = queries(&store)
        .get_acquired_tickets(CustomerId(7), 1, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidPage { .. }));
}

#[tokio::test]
async fn nested_detail_failure_fails_the_listing() {
    let store = seeded();
    store.fail_event_details(Some(EventId::new("E2")));

    let err = queries(&store).get_many_events(1, 10).await.unwrap_err();
    assert!(matches!(err, CatalogError::Infrastructure(_)), "{err:?}");
}

#[tokio::test]
async fn slow_reads_time_out() {
    let store = seeded();
    store.delay_reads(Some(Duration::from_millis(500)));
    let catalog = CatalogQueries::new(Arc::new(store.clone()), Duration::from_millis(50));

    let err = catalog.get_many_events(1, 10).await.unwrap_err();
    assert_eq!(err, CatalogError::Timeout);
    assert_eq!(ApiError::from(err).tag(), "TIMEOUT");
}

#[tokio::test]
async fn configured_catalog_deadline_bounds_reads() {
    let store = seeded();
    store.delay_reads(Some(Duration::from_millis(500)));
    let mut config = Config::from_env();
    config.catalog.timeout_ms = 50;

    let catalog = CatalogQueries::new(Arc::new(store.clone()), config.catalog_timeout());

    let err = catalog.get_many_events(1, 1).await.unwrap_err();
    assert_eq!(err, CatalogError::Timeout);
}

#[tokio::test]
async fn reads_run_concurrently() {
    let store = seeded();
    store.delay_reads(Some(Duration::from_millis(100)));
    let catalog = CatalogQueries::new(Arc::new(store.clone()), Duration::from_millis(1_000));

    // count + list, then artists + promotors for three events: two rounds of overlap
    let started = std::time::Instant::now();
    let page = catalog.get_many_events(1, 10).await.unwrap();
    assert_eq!(page.events.len(), 3);
    assert!(started.elapsed() < Duration::from_millis(600));
}

#[tokio::test]
async fn shows_come_with_their_location() {
    let store = seeded();
    store.insert_show(fixtures::show("SH2", fixtures::EVENT_ID));
    store.insert_location(&ShowId::new("SH2"), fixtures::location());

    let shows = queries(&store)
        .get_many_shows(&EventId::new(fixtures::EVENT_ID))
        .await
        .unwrap();

    assert_eq!(shows.len(), 2);
    assert!(shows.iter().all(|v| v.location.city == "Jakarta"));
    let json = serde_json::to_value(&shows[0]).unwrap();
    assert_eq!(json["type"], "offline");
    assert_eq!(json["location"]["country"], "Indonesia");
}

#[tokio::test]
async fn show_without_location_is_not_found() {
    let store = seeded();
    store.insert_show(fixtures::show("SH-NOLOC", fixtures::EVENT_ID));

    let err = queries(&store)
        .get_many_shows(&EventId::new(fixtures::EVENT_ID))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
}

#[tokio::test]
async fn acquired_tickets_are_paged_newest_first() {
    let store = seeded();
    record_tickets(&store, 7, 3).await;
    record_tickets(&store, 8, 1).await;

    let page = queries(&store)
        .get_acquired_tickets(CustomerId(7), 1, 2)
        .await
        .unwrap();

    assert_eq!(page.total, 3);
    let numbers: Vec<&str> = page.tickets.iter().map(|t| t.number.as_str()).collect();
    assert_eq!(numbers, vec!["C7N00000000000000002", "C7N00000000000000001"]);

    let rest = queries(&store)
        .get_acquired_tickets(CustomerId(7), 2, 2)
        .await
        .unwrap();
    assert_eq!(rest.tickets.len(), 1);
}

mod paging {
    use proptest::prelude::*;
    use ticket_stock::catalog::paging;

    proptest! {
        #[test]
        fn offset_skips_whole_previous_pages(page in 1i64..10_000, size in 1i64..1_000) {
            let (offset, limit) = paging(page, size).unwrap();
            prop_assert_eq!(limit, size);
            prop_assert_eq!(offset, (page - 1) * size);
        }

        #[test]
        fn non_positive_page_or_size_is_rejected(page in -100i64..1, size in -100i64..100) {
            prop_assert!(paging(page, size).is_err());
            prop_assert!(paging(size.abs() + 1, page).is_err());
        }
    }
}
