//! In-memory implementation of every storage capability.
//!
//! [`InMemoryStore`] behaves like the Postgres store where it matters for
//! acquisition tests:
//!
//! - `lock_for_update` takes a per-row async mutex and keeps the owned guard in
//!   the transaction, so a second transaction locking the same row waits until
//!   the first one commits, rolls back or is dropped
//! - writes are staged on the [`InMemoryTx`] and applied in one step on commit
//! - acquired-ticket numbers are unique, a duplicate is a `Conflict`
//!
//! Faults can be injected per store to exercise failure paths, and counters
//! expose how many transactions were begun, committed and rolled back.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use ticket_stock_core::store::{
    AcquisitionRecorder, CatalogLookup, CatalogReader, StockLedger, StoreError,
    TransactionCoordinator,
};
use ticket_stock_core::types::{
    AcquiredTicket, AcquiredTicketId, Artist, CustomerId, Event, EventId, Location, Promotor, Show,
    ShowId, TicketStock, TicketStockId,
};
use tokio::sync::OwnedMutexGuard;

#[derive(Default)]
struct Tables {
    events: BTreeMap<EventId, Event>,
    artists: HashMap<EventId, Vec<Artist>>,
    promotors: HashMap<EventId, Vec<Promotor>>,
    shows: BTreeMap<ShowId, Show>,
    locations: HashMap<ShowId, Location>,
    stocks: HashMap<TicketStockId, TicketStock>,
    tickets: Vec<AcquiredTicket>,
}

impl Tables {
    fn number_taken(&self, number: &str) -> bool {
        self.tickets.iter().any(|t| t.number == number)
    }
}

#[derive(Default)]
struct Faults {
    fail_begin: bool,
    fail_commit: bool,
    fail_save: bool,
    fail_event_details: Option<EventId>,
    read_delay: Option<Duration>,
    commit_delay: Option<Duration>,
}

#[derive(Default)]
struct Counters {
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    locks: AtomicUsize,
}

#[derive(Default)]
struct Inner {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<TicketStockId, Arc<tokio::sync::Mutex<()>>>>,
    next_ticket_id: AtomicI64,
    faults: RwLock<Faults>,
    counters: Counters,
}

/// In-memory store with row-level locking semantics.
///
/// Cloning shares the underlying data, so a test can keep a handle for
/// inspection while the service owns another.
///
/// # Example
///
/// ```
/// use ticket_stock_testing::InMemoryStore;
/// use ticket_stock_core::store::{StockLedger, TransactionCoordinator};
/// use ticket_stock_core::types::TicketStockId;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryStore::new();
/// let mut tx = store.begin().await?;
/// let missing = store.lock_for_update(&TicketStockId::new("nope"), &mut tx).await;
/// assert!(missing.is_err());
/// store.rollback(tx).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("begins", &self.begin_count())
            .field("commits", &self.commit_count())
            .field("rollbacks", &self.rollback_count())
            .finish_non_exhaustive()
    }
}

/// Transaction handle of the [`InMemoryStore`].
///
/// Holds the row locks taken so far and the writes staged for commit. Dropping
/// the handle discards the writes and releases the locks.
#[derive(Default)]
pub struct InMemoryTx {
    guards: HashMap<TicketStockId, OwnedMutexGuard<()>>,
    stocks: HashMap<TicketStockId, TicketStock>,
    tickets: Vec<AcquiredTicket>,
}

impl InMemoryTx {
    /// Number of rows currently locked by this transaction.
    #[must_use]
    pub fn locked_rows(&self) -> usize {
        self.guards.len()
    }
}

impl fmt::Debug for InMemoryTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTx")
            .field("locked", &self.guards.keys().collect::<Vec<_>>())
            .field("staged_stocks", &self.stocks.len())
            .field("staged_tickets", &self.tickets.len())
            .finish()
    }
}

fn count(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

fn page<T>(rows: impl Iterator<Item = T>, offset: i64, limit: i64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(0);
    let limit = usize::try_from(limit).unwrap_or(0);
    rows.skip(offset).take(limit).collect()
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    /// Insert or replace an event.
    pub fn insert_event(&self, event: Event) {
        self.inner
            .tables
            .write()
            .unwrap()
            .events
            .insert(event.id.clone(), event);
    }

    /// Attach an artist to an event.
    pub fn insert_artist(&self, event_id: &EventId, artist: Artist) {
        self.inner
            .tables
            .write()
            .unwrap()
            .artists
            .entry(event_id.clone())
            .or_default()
            .push(artist);
    }

    /// Attach a promotor to an event.
    pub fn insert_promotor(&self, event_id: &EventId, promotor: Promotor) {
        self.inner
            .tables
            .write()
            .unwrap()
            .promotors
            .entry(event_id.clone())
            .or_default()
            .push(promotor);
    }

    /// Insert or replace a show.
    pub fn insert_show(&self, show: Show) {
        self.inner
            .tables
            .write()
            .unwrap()
            .shows
            .insert(show.id.clone(), show);
    }

    /// Insert or replace the location of a show.
    pub fn insert_location(&self, show_id: &ShowId, location: Location) {
        self.inner
            .tables
            .write()
            .unwrap()
            .locations
            .insert(show_id.clone(), location);
    }

    /// Insert or replace a ticket-stock row.
    pub fn insert_stock(&self, stock: TicketStock) {
        self.inner
            .tables
            .write()
            .unwrap()
            .stocks
            .insert(stock.id.clone(), stock);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Committed state of a stock row.
    #[must_use]
    pub fn stock(&self, id: &TicketStockId) -> Option<TicketStock> {
        self.inner.tables.read().unwrap().stocks.get(id).cloned()
    }

    /// Every committed acquired ticket, in insertion order.
    #[must_use]
    pub fn acquired_tickets(&self) -> Vec<AcquiredTicket> {
        self.inner.tables.read().unwrap().tickets.clone()
    }

    /// Number of transactions begun.
    #[must_use]
    pub fn begin_count(&self) -> usize {
        self.inner.counters.begins.load(Ordering::SeqCst)
    }

    /// Number of transactions committed successfully.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.inner.counters.commits.load(Ordering::SeqCst)
    }

    /// Number of explicit rollbacks.
    #[must_use]
    pub fn rollback_count(&self) -> usize {
        self.inner.counters.rollbacks.load(Ordering::SeqCst)
    }

    /// Number of `lock_for_update` calls.
    #[must_use]
    pub fn lock_count(&self) -> usize {
        self.inner.counters.locks.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------

    /// Make `begin` fail.
    pub fn fail_begin(&self, fail: bool) {
        self.inner.faults.write().unwrap().fail_begin = fail;
    }

    /// Make `commit` fail (the staged writes are discarded).
    pub fn fail_commit(&self, fail: bool) {
        self.inner.faults.write().unwrap().fail_commit = fail;
    }

    /// Delay every commit by `delay` before it applies the staged writes.
    pub fn delay_commits(&self, delay: Option<Duration>) {
        self.inner.faults.write().unwrap().commit_delay = delay;
    }

    /// Make acquired-ticket inserts fail.
    pub fn fail_save(&self, fail: bool) {
        self.inner.faults.write().unwrap().fail_save = fail;
    }

    /// Make artist and promotor reads of one event fail.
    pub fn fail_event_details(&self, event_id: Option<EventId>) {
        self.inner.faults.write().unwrap().fail_event_details = event_id;
    }

    /// Delay every catalog read by `delay`.
    pub fn delay_reads(&self, delay: Option<Duration>) {
        self.inner.faults.write().unwrap().read_delay = delay;
    }

    async fn read_delay(&self) {
        let delay = self.inner.faults.read().unwrap().read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_event_details(&self, event_id: &EventId) -> Result<(), StoreError> {
        let faults = self.inner.faults.read().unwrap();
        if faults.fail_event_details.as_ref() == Some(event_id) {
            return Err(StoreError::Database(format!(
                "injected read failure for event '{event_id}'"
            )));
        }
        Ok(())
    }

    fn row_lock(&self, stock_id: &TicketStockId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.inner.row_locks.lock().unwrap();
        Arc::clone(locks.entry(stock_id.clone()).or_default())
    }
}

#[async_trait]
impl TransactionCoordinator for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx, StoreError> {
        self.inner.counters.begins.fetch_add(1, Ordering::SeqCst);
        if self.inner.faults.read().unwrap().fail_begin {
            return Err(StoreError::Database("injected begin failure".to_string()));
        }
        Ok(InMemoryTx::default())
    }

    async fn commit(&self, tx: InMemoryTx) -> Result<(), StoreError> {
        let delay = self.inner.faults.read().unwrap().commit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.inner.faults.read().unwrap().fail_commit {
            return Err(StoreError::Database("injected commit failure".to_string()));
        }

        {
            let mut tables = self.inner.tables.write().unwrap();
            if let Some(dup) = tx.tickets.iter().find(|t| tables.number_taken(&t.number)) {
                return Err(StoreError::Conflict(format!(
                    "ticket number '{}' already exists",
                    dup.number
                )));
            }
            for (id, stock) in &tx.stocks {
                tables.stocks.insert(id.clone(), stock.clone());
            }
            tables.tickets.extend(tx.tickets.iter().cloned());
        }

        self.inner.counters.commits.fetch_add(1, Ordering::SeqCst);
        drop(tx);
        Ok(())
    }

    async fn rollback(&self, tx: InMemoryTx) -> Result<(), StoreError> {
        self.inner.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        drop(tx);
        Ok(())
    }
}

#[async_trait]
impl StockLedger<InMemoryTx> for InMemoryStore {
    async fn lock_for_update(
        &self,
        stock_id: &TicketStockId,
        tx: &mut InMemoryTx,
    ) -> Result<TicketStock, StoreError> {
        self.inner.counters.locks.fetch_add(1, Ordering::SeqCst);

        if !tx.guards.contains_key(stock_id) {
            let guard = self.row_lock(stock_id).lock_owned().await;
            tx.guards.insert(stock_id.clone(), guard);
        }

        if let Some(staged) = tx.stocks.get(stock_id) {
            return Ok(staged.clone());
        }
        self.stock(stock_id)
            .ok_or_else(|| StoreError::not_found("ticket stock", stock_id))
    }

    async fn update(
        &self,
        stock_id: &TicketStockId,
        stock: &TicketStock,
        tx: &mut InMemoryTx,
    ) -> Result<(), StoreError> {
        if !tx.stocks.contains_key(stock_id) && self.stock(stock_id).is_none() {
            return Err(StoreError::not_found("ticket stock", stock_id));
        }
        tx.stocks.insert(stock_id.clone(), stock.clone());
        Ok(())
    }
}

#[async_trait]
impl CatalogLookup<InMemoryTx> for InMemoryStore {
    async fn find_event_by_id(
        &self,
        id: &EventId,
        _tx: Option<&mut InMemoryTx>,
    ) -> Result<Event, StoreError> {
        let tables = self.inner.tables.read().unwrap();
        tables
            .events
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("event", id))
    }

    async fn find_show_by_id(
        &self,
        id: &ShowId,
        _tx: Option<&mut InMemoryTx>,
    ) -> Result<Show, StoreError> {
        let tables = self.inner.tables.read().unwrap();
        tables
            .shows
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("show", id))
    }

    async fn find_location_by_show_id(
        &self,
        show_id: &ShowId,
        _tx: Option<&mut InMemoryTx>,
    ) -> Result<Location, StoreError> {
        let tables = self.inner.tables.read().unwrap();
        tables
            .locations
            .get(show_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("location", show_id))
    }
}

#[async_trait]
impl AcquisitionRecorder<InMemoryTx> for InMemoryStore {
    async fn save(
        &self,
        ticket: &AcquiredTicket,
        tx: &mut InMemoryTx,
    ) -> Result<AcquiredTicketId, StoreError> {
        if self.inner.faults.read().unwrap().fail_save {
            return Err(StoreError::Database("injected insert failure".to_string()));
        }

        let taken = tx.tickets.iter().any(|t| t.number == ticket.number)
            || self.inner.tables.read().unwrap().number_taken(&ticket.number);
        if taken {
            return Err(StoreError::Conflict(format!(
                "ticket number '{}' already exists",
                ticket.number
            )));
        }

        let id = AcquiredTicketId(self.inner.next_ticket_id.fetch_add(1, Ordering::SeqCst) + 1);
        tx.tickets.push(ticket.clone().with_id(id));
        Ok(id)
    }
}

#[async_trait]
impl CatalogReader for InMemoryStore {
    async fn count_events(&self) -> Result<i64, StoreError> {
        self.read_delay().await;
        Ok(count(self.inner.tables.read().unwrap().events.len()))
    }

    async fn list_events(&self, offset: i64, limit: i64) -> Result<Vec<Event>, StoreError> {
        self.read_delay().await;
        let tables = self.inner.tables.read().unwrap();
        Ok(page(tables.events.values().rev().cloned(), offset, limit))
    }

    async fn list_artists(&self, event_id: &EventId) -> Result<Vec<Artist>, StoreError> {
        self.read_delay().await;
        self.check_event_details(event_id)?;
        let tables = self.inner.tables.read().unwrap();
        Ok(tables.artists.get(event_id).cloned().unwrap_or_default())
    }

    async fn list_promotors(&self, event_id: &EventId) -> Result<Vec<Promotor>, StoreError> {
        self.read_delay().await;
        self.check_event_details(event_id)?;
        let tables = self.inner.tables.read().unwrap();
        Ok(tables.promotors.get(event_id).cloned().unwrap_or_default())
    }

    async fn list_shows(&self, event_id: &EventId) -> Result<Vec<Show>, StoreError> {
        self.read_delay().await;
        let tables = self.inner.tables.read().unwrap();
        Ok(tables
            .shows
            .values()
            .filter(|s| &s.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn show_location(&self, show_id: &ShowId) -> Result<Location, StoreError> {
        self.read_delay().await;
        self.find_location_by_show_id(show_id, None).await
    }

    async fn count_acquired_tickets(&self, customer_id: CustomerId) -> Result<i64, StoreError> {
        self.read_delay().await;
        let tables = self.inner.tables.read().unwrap();
        Ok(count(
            tables
                .tickets
                .iter()
                .filter(|t| t.customer_id == customer_id)
                .count(),
        ))
    }

    async fn list_acquired_tickets(
        &self,
        customer_id: CustomerId,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AcquiredTicket>, StoreError> {
        self.read_delay().await;
        let tables = self.inner.tables.read().unwrap();
        let mut rows: Vec<AcquiredTicket> = tables
            .tickets
            .iter()
            .filter(|t| t.customer_id == customer_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(page(rows.into_iter(), offset, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use std::time::Duration;

    #[tokio::test]
    async fn second_lock_waits_for_commit() {
        let store = InMemoryStore::new();
        store.insert_stock(fixtures::stock("S1", 100, 40));
        let id = TicketStockId::new("S1");

        let mut first = store.begin().await.unwrap();
        let mut row = store.lock_for_update(&id, &mut first).await.unwrap();

        let contender = store.clone();
        let waiter = tokio::spawn(async move {
            let mut second = contender.begin().await.unwrap();
            let row = contender
                .lock_for_update(&TicketStockId::new("S1"), &mut second)
                .await
                .unwrap();
            contender.rollback(second).await.unwrap();
            row.acquired
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        row.acquired = 45;
        store.update(&id, &row, &mut first).await.unwrap();
        store.commit(first).await.unwrap();

        assert_eq!(waiter.await.unwrap(), 45);
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes_and_releases_lock() {
        let store = InMemoryStore::new();
        store.insert_stock(fixtures::stock("S1", 10, 0));
        let id = TicketStockId::new("S1");

        let mut tx = store.begin().await.unwrap();
        let mut row = store.lock_for_update(&id, &mut tx).await.unwrap();
        row.acquired = 9;
        store.update(&id, &row, &mut tx).await.unwrap();
        drop(tx);

        let mut next = store.begin().await.unwrap();
        let row = tokio::time::timeout(
            Duration::from_millis(100),
            store.lock_for_update(&id, &mut next),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(row.acquired, 0);
    }

    #[tokio::test]
    async fn relocking_in_same_transaction_sees_staged_row() {
        let store = InMemoryStore::new();
        store.insert_stock(fixtures::stock("S1", 10, 0));
        let id = TicketStockId::new("S1");

        let mut tx = store.begin().await.unwrap();
        let mut row = store.lock_for_update(&id, &mut tx).await.unwrap();
        row.acquired = 3;
        store.update(&id, &row, &mut tx).await.unwrap();

        let again = store.lock_for_update(&id, &mut tx).await.unwrap();
        assert_eq!(again.acquired, 3);
        assert_eq!(tx.locked_rows(), 1);
    }

    #[tokio::test]
    async fn duplicate_ticket_number_is_a_conflict() {
        let store = InMemoryStore::new();
        let ticket = fixtures::acquired_ticket("NUMBER00000000000001", 7);

        let mut tx = store.begin().await.unwrap();
        store.save(&ticket, &mut tx).await.unwrap();
        store.commit(tx).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = store.save(&ticket, &mut tx).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn failed_commit_persists_nothing() {
        let store = InMemoryStore::new();
        store.fail_commit(true);

        let mut tx = store.begin().await.unwrap();
        store
            .save(&fixtures::acquired_ticket("NUMBER00000000000002", 7), &mut tx)
            .await
            .unwrap();
        assert!(store.commit(tx).await.is_err());
        assert!(store.acquired_tickets().is_empty());
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .find_show_by_id(&ShowId::new("nope"), None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "show with id 'nope' is not found");
    }

    #[tokio::test]
    async fn events_list_newest_id_first() {
        let store = InMemoryStore::new();
        for id in ["E1", "E2", "E3"] {
            store.insert_event(fixtures::event(id));
        }
        let page = store.list_events(1, 5).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["E2", "E1"]);
        assert_eq!(store.count_events().await.unwrap(), 3);
    }
}
