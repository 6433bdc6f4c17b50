//! Row shapes returned by the queries, converted into domain types.

use chrono::{DateTime, Utc};
use ticket_stock_core::types::{
    AcquiredTicket, AcquiredTicketId, Artist, CustomerId, Event, EventId, Location, OrderId,
    Promotor, Show, ShowId, TicketStock, TicketStockId,
};

#[derive(sqlx::FromRow)]
pub(crate) struct TicketStockRow {
    event_id: String,
    show_id: String,
    id: String,
    online_for: Option<String>,
    tier: String,
    allocation: i64,
    price: f64,
    acquired: i64,
    last_stock_update: DateTime<Utc>,
}

impl From<TicketStockRow> for TicketStock {
    fn from(row: TicketStockRow) -> Self {
        Self {
            event_id: EventId::new(row.event_id),
            show_id: ShowId::new(row.show_id),
            id: TicketStockId::new(row.id),
            online_for: row.online_for,
            tier: row.tier,
            allocation: row.allocation,
            price: row.price,
            acquired: row.acquired,
            last_stock_update: row.last_stock_update,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct EventRow {
    id: String,
    name: String,
    description: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            id: EventId::new(row.id),
            name: row.name,
            description: row.description,
            status: row.status,
            artists: Vec::new(),
            promotors: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ArtistRow {
    name: String,
}

impl From<ArtistRow> for Artist {
    fn from(row: ArtistRow) -> Self {
        Self { name: row.name }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PromotorRow {
    name: String,
    email: String,
    phone: String,
}

impl From<PromotorRow> for Promotor {
    fn from(row: PromotorRow) -> Self {
        Self {
            name: row.name,
            email: row.email,
            phone: row.phone,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ShowRow {
    id: String,
    event_id: String,
    venue: String,
    #[sqlx(rename = "type")]
    show_type: String,
    time: DateTime<Utc>,
    status: String,
}

impl From<ShowRow> for Show {
    fn from(row: ShowRow) -> Self {
        Self {
            id: ShowId::new(row.id),
            event_id: EventId::new(row.event_id),
            venue: row.venue,
            show_type: row.show_type,
            time: row.time,
            status: row.status,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct LocationRow {
    country: String,
    city: String,
    formatted_address: String,
    latitude: f64,
    longitude: f64,
}

impl From<LocationRow> for Location {
    fn from(row: LocationRow) -> Self {
        Self {
            country: row.country,
            city: row.city,
            formatted_address: row.formatted_address,
            latitude: row.latitude,
            longitude: row.longitude,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct AcquiredTicketRow {
    id: i64,
    number: String,
    event_id: String,
    show_id: String,
    tier: String,
    ticket_stock_id: String,
    event_name: String,
    show_venue: String,
    show_type: String,
    show_country: String,
    show_city: String,
    show_formatted_address: String,
    show_time: DateTime<Utc>,
    customer_name: String,
    customer_email: String,
    customer_id: i64,
    created_at: DateTime<Utc>,
    order_id: String,
}

impl From<AcquiredTicketRow> for AcquiredTicket {
    fn from(row: AcquiredTicketRow) -> Self {
        Self {
            id: Some(AcquiredTicketId(row.id)),
            number: row.number,
            event_id: EventId::new(row.event_id),
            show_id: ShowId::new(row.show_id),
            tier: row.tier,
            ticket_stock_id: TicketStockId::new(row.ticket_stock_id),
            event_name: row.event_name,
            show_venue: row.show_venue,
            show_type: row.show_type,
            show_country: row.show_country,
            show_city: row.show_city,
            show_formatted_address: row.show_formatted_address,
            show_time: row.show_time,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_id: CustomerId(row.customer_id),
            created_at: row.created_at,
            order_id: OrderId::new(row.order_id),
        }
    }
}
