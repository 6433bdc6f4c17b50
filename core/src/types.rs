//! Domain types for ticket-stock acquisition.
//!
//! This module contains the inventory row ([`TicketStock`]), the immutable sold-ticket
//! fact ([`AcquiredTicket`]), the inbound [`OrderPaidEvent`] and the catalog records
//! that an acquisition denormalizes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a catalog event (a tour, festival, ...)
    EventId
);
string_id!(
    /// Identifier of a single show of an event
    ShowId
);
string_id!(
    /// Identifier of a ticket-stock row (one tier of one show)
    TicketStockId
);
string_id!(
    /// Identifier of the upstream order
    OrderId
);

/// Identifier of a customer account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub i64);

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned identity of an acquired ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcquiredTicketId(pub i64);

impl fmt::Display for AcquiredTicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Ticket stock
// ============================================================================

/// Whether an acquisition may push `acquired` past `allocation`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityPolicy {
    /// Reject any acquisition that would exceed the allocation
    #[default]
    Enforce,
    /// Increment without checking (historical oversell-permitting behavior)
    Unchecked,
}

impl CapacityPolicy {
    /// Parse from a configuration string (`enforce` / `unchecked`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enforce" => Some(Self::Enforce),
            "unchecked" => Some(Self::Unchecked),
            _ => None,
        }
    }
}

/// An acquisition would exceed the stock allocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("ticket stock '{stock_id}' has {remaining} remaining, {requested} requested")]
pub struct InsufficientStock {
    /// Stock that was asked for
    pub stock_id: TicketStockId,
    /// Quantity requested
    pub requested: i64,
    /// Units left before the allocation is reached
    pub remaining: i64,
}

/// Inventory row tracking allocation vs. acquired count for one tier of one show.
///
/// `acquired` only ever grows, and only through [`TicketStock::acquire`] while the
/// row is locked by the mutating transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TicketStock {
    /// Owning event
    pub event_id: EventId,
    /// Owning show
    pub show_id: ShowId,
    /// Stock identity
    pub id: TicketStockId,
    /// Channel marker this stock has been online for, if any
    pub online_for: Option<String>,
    /// Tier label (e.g. "VIP", "CAT 1")
    pub tier: String,
    /// Capacity ceiling
    pub allocation: i64,
    /// Unit price
    pub price: f64,
    /// Units sold so far
    pub acquired: i64,
    /// Last time `acquired` changed
    pub last_stock_update: DateTime<Utc>,
}

impl TicketStock {
    /// Units left before the allocation is reached (never negative).
    #[must_use]
    pub fn remaining(&self) -> i64 {
        self.allocation.saturating_sub(self.acquired).max(0)
    }

    /// Apply an acquisition of `quantity` units at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`InsufficientStock`] under [`CapacityPolicy::Enforce`] when
    /// `acquired + quantity` would exceed `allocation`, and under either policy
    /// when the sum does not fit in an `i64`. The row is left untouched.
    pub fn acquire(
        &mut self,
        quantity: i64,
        now: DateTime<Utc>,
        policy: CapacityPolicy,
    ) -> Result<(), InsufficientStock> {
        let acquired = self
            .acquired
            .checked_add(quantity)
            .filter(|&total| policy == CapacityPolicy::Unchecked || total <= self.allocation)
            .ok_or_else(|| InsufficientStock {
                stock_id: self.id.clone(),
                requested: quantity,
                remaining: self.remaining(),
            })?;

        self.acquired = acquired;
        self.last_stock_update = now;
        Ok(())
    }
}

// ============================================================================
// Acquired ticket
// ============================================================================

/// Immutable fact: one sold ticket.
///
/// Event, show and location fields are copied at acquisition time so the record
/// stays meaningful when the catalog rows change later.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcquiredTicket {
    /// Store-assigned identity, `None` until recorded
    pub id: Option<AcquiredTicketId>,
    /// Human-readable ticket number (20 chars, `A-Z0-9`)
    pub number: String,
    /// Source event
    pub event_id: EventId,
    /// Source show
    pub show_id: ShowId,
    /// Tier label copied from the stock
    pub tier: String,
    /// Originating stock row
    pub ticket_stock_id: TicketStockId,
    /// Event name at acquisition time
    pub event_name: String,
    /// Show venue at acquisition time
    pub show_venue: String,
    /// Show type at acquisition time
    pub show_type: String,
    /// Show country at acquisition time
    pub show_country: String,
    /// Show city at acquisition time
    pub show_city: String,
    /// Show address at acquisition time
    pub show_formatted_address: String,
    /// Show start time
    pub show_time: DateTime<Utc>,
    /// Buyer name
    pub customer_name: String,
    /// Buyer email
    pub customer_email: String,
    /// Buyer account
    pub customer_id: CustomerId,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Originating order
    pub order_id: OrderId,
}

impl AcquiredTicket {
    /// Attach the identity returned by the recorder.
    #[must_use]
    pub fn with_id(mut self, id: AcquiredTicketId) -> Self {
        self.id = Some(id);
        self
    }
}

// ============================================================================
// Inbound order fact
// ============================================================================

/// One line of a paid order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Event the tickets belong to
    pub event_id: EventId,
    /// Show the tickets belong to
    pub show_id: ShowId,
    /// Stock to draw from
    pub ticket_stock_id: TicketStockId,
    /// Units bought
    pub quantity: i64,
}

/// Upstream "order paid" fact that triggers an acquisition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    /// Order id
    pub id: OrderId,
    /// Buyer name
    pub customer_name: String,
    /// Buyer email
    pub customer_email: String,
    /// Buyer account
    pub customer_id: CustomerId,
    /// Order lines
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

// ============================================================================
// Catalog records
// ============================================================================

/// Catalog event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Identity
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Publication status
    pub status: String,
    /// Artists performing (filled by the read aggregator)
    #[serde(default)]
    pub artists: Vec<Artist>,
    /// Promotors (filled by the read aggregator)
    #[serde(default)]
    pub promotors: Vec<Promotor>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

/// Performing artist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    /// Stage name
    pub name: String,
}

/// Event promotor contact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotor {
    /// Name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Contact phone
    pub phone: String,
}

/// One show of an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Show {
    /// Identity
    pub id: ShowId,
    /// Owning event
    pub event_id: EventId,
    /// Venue name
    pub venue: String,
    /// Show type (e.g. "offline", "online")
    #[serde(rename = "type")]
    pub show_type: String,
    /// Start time
    pub time: DateTime<Utc>,
    /// Publication status
    pub status: String,
}

/// Venue location of a show.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Country
    pub country: String,
    /// City
    pub city: String,
    /// Full postal address
    pub formatted_address: String,
    /// Latitude
    pub latitude: f64,
    /// Longitude
    pub longitude: f64,
}
