//! Catalog and order fixtures.
//!
//! The default catalog is one event `E1` with one show `SH1` (located in
//! Jakarta) and a VIP stock `S1` with allocation 100 of which 40 are acquired.

use crate::InMemoryStore;
use crate::mocks::test_clock;
use chrono::{DateTime, Utc};
use ticket_stock_core::environment::Clock;
use ticket_stock_core::types::{
    AcquiredTicket, Artist, CustomerId, Event, EventId, Location, OrderId, OrderItem,
    OrderPaidEvent, Promotor, Show, ShowId, TicketStock, TicketStockId,
};

/// Event id of the default catalog.
pub const EVENT_ID: &str = "E1";
/// Show id of the default catalog.
pub const SHOW_ID: &str = "SH1";
/// Stock id of the default catalog.
pub const STOCK_ID: &str = "S1";

fn fixed_now() -> DateTime<Utc> {
    test_clock().now()
}

/// A published event without artists or promotors.
#[must_use]
pub fn event(id: &str) -> Event {
    Event {
        id: EventId::new(id),
        name: format!("Event {id}"),
        description: "A night to remember".to_string(),
        status: "published".to_string(),
        artists: Vec::new(),
        promotors: Vec::new(),
        created_at: fixed_now(),
        updated_at: fixed_now(),
    }
}

/// An offline show of `event_id`.
#[must_use]
pub fn show(id: &str, event_id: &str) -> Show {
    Show {
        id: ShowId::new(id),
        event_id: EventId::new(event_id),
        venue: "Istora Senayan".to_string(),
        show_type: "offline".to_string(),
        time: fixed_now() + chrono::Duration::days(30),
        status: "published".to_string(),
    }
}

/// A location in Jakarta.
#[must_use]
pub fn location() -> Location {
    Location {
        country: "Indonesia".to_string(),
        city: "Jakarta".to_string(),
        formatted_address: "Jl. Pintu Satu Senayan, Jakarta".to_string(),
        latitude: -6.218_4,
        longitude: 106.802_2,
    }
}

/// A VIP stock of the default show.
#[must_use]
pub fn stock(id: &str, allocation: i64, acquired: i64) -> TicketStock {
    TicketStock {
        event_id: EventId::new(EVENT_ID),
        show_id: ShowId::new(SHOW_ID),
        id: TicketStockId::new(id),
        online_for: None,
        tier: "VIP".to_string(),
        allocation,
        price: 1_500_000.0,
        acquired,
        last_stock_update: fixed_now() - chrono::Duration::days(1),
    }
}

/// An unrecorded acquired ticket for `customer_id`.
#[must_use]
pub fn acquired_ticket(number: &str, customer_id: i64) -> AcquiredTicket {
    let show = show(SHOW_ID, EVENT_ID);
    let location = location();
    AcquiredTicket {
        id: None,
        number: number.to_string(),
        event_id: EventId::new(EVENT_ID),
        show_id: show.id,
        tier: "VIP".to_string(),
        ticket_stock_id: TicketStockId::new(STOCK_ID),
        event_name: format!("Event {EVENT_ID}"),
        show_venue: show.venue,
        show_type: show.show_type,
        show_country: location.country,
        show_city: location.city,
        show_formatted_address: location.formatted_address,
        show_time: show.time,
        customer_name: "Ana".to_string(),
        customer_email: "ana@example.com".to_string(),
        customer_id: CustomerId(customer_id),
        created_at: fixed_now(),
        order_id: OrderId::new("ORD-0"),
    }
}

/// One order line against the default show.
#[must_use]
pub fn item(stock_id: &str, quantity: i64) -> OrderItem {
    OrderItem {
        event_id: EventId::new(EVENT_ID),
        show_id: ShowId::new(SHOW_ID),
        ticket_stock_id: TicketStockId::new(stock_id),
        quantity,
    }
}

/// A paid order of customer 7.
#[must_use]
pub fn order_paid(order_id: &str, items: Vec<OrderItem>) -> OrderPaidEvent {
    OrderPaidEvent {
        id: OrderId::new(order_id),
        customer_name: "Ana".to_string(),
        customer_email: "ana@example.com".to_string(),
        customer_id: CustomerId(7),
        items,
    }
}

/// Seed the default catalog: `E1`, `SH1` with its location, and `S1` (100/40).
pub fn seed_catalog(store: &InMemoryStore) {
    let event_id = EventId::new(EVENT_ID);
    store.insert_event(event(EVENT_ID));
    store.insert_artist(
        &event_id,
        Artist {
            name: "Sheila on 7".to_string(),
        },
    );
    store.insert_promotor(
        &event_id,
        Promotor {
            name: "Java Festival".to_string(),
            email: "hello@javafestival.example".to_string(),
            phone: "+62-21-555-0100".to_string(),
        },
    );
    store.insert_show(show(SHOW_ID, EVENT_ID));
    store.insert_location(&ShowId::new(SHOW_ID), location());
    store.insert_stock(stock(STOCK_ID, 100, 40));
}
