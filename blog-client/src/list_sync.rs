//! Paginated list reconciliation.
//!
//! [`ListSynchronizer`] is the pure state machine: it hands out fetch
//! tickets and folds responses back in. [`ListView`] drives it against a
//! [`PageSource`] without holding its lock across network calls.
//!
//! ```text
//! Idle ──reset──▶ Loading ──ok──▶ Loaded ──append──▶ LoadingMore ──ok──▶ Loaded
//!                    │                                   │
//!                    └───────────err──▶ Error ◀──err─────┘
//! ```
//!
//! Every reset starts a new generation; responses carrying an older
//! generation are dropped, so a slow append can never overwrite a newer
//! reset.

use std::cmp::Reverse;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BlogClientError;
use crate::models::{Page, ResourceId, ResourceItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Thread-reading order.
    OldestFirst,
    /// Chronological feed order.
    NewestFirst,
    /// Keep the order the server sent.
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListState {
    Idle,
    Loading,
    Loaded,
    LoadingMore,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Reset,
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub kind: FetchKind,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Accepted,
    Stale,
}

#[derive(Debug, Clone)]
pub struct ListSynchronizer<T> {
    items: Vec<T>,
    cursor: PageCursor,
    state: ListState,
    order: SortOrder,
    generation: u64,
    append_in_flight: bool,
}

impl<T: ResourceItem> ListSynchronizer<T> {
    pub fn new(page_size: u32, order: SortOrder) -> Self {
        Self {
            items: Vec::new(),
            cursor: PageCursor {
                page: 1,
                page_size: page_size.max(1),
                has_more: true,
            },
            state: ListState::Idle,
            order,
            generation: 0,
            append_in_flight: false,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn cursor(&self) -> PageCursor {
        self.cursor
    }

    pub fn state(&self) -> &ListState {
        &self.state
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_append_in_flight(&self) -> bool {
        self.append_in_flight
    }

    /// Starts a page-1 fetch that will replace the list.
    ///
    /// Supersedes any outstanding fetch.
    pub fn begin_reset(&mut self) -> FetchTicket {
        self.generation += 1;
        self.append_in_flight = false;
        self.cursor.has_more = true;
        self.state = ListState::Loading;
        FetchTicket {
            generation: self.generation,
            kind: FetchKind::Reset,
            page: 1,
            page_size: self.cursor.page_size,
        }
    }

    /// Starts a fetch of the next page, or returns `None` when one may not
    /// be issued right now.
    pub fn begin_append(&mut self) -> Option<FetchTicket> {
        if self.state != ListState::Loaded || !self.cursor.has_more || self.append_in_flight {
            return None;
        }
        self.append_in_flight = true;
        self.state = ListState::LoadingMore;
        Some(FetchTicket {
            generation: self.generation,
            kind: FetchKind::Append,
            page: self.cursor.page + 1,
            page_size: self.cursor.page_size,
        })
    }

    fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation
            && (ticket.kind == FetchKind::Reset || self.append_in_flight)
    }

    pub fn complete(&mut self, ticket: FetchTicket, page: Page<T>) -> Applied {
        if !self.is_current(&ticket) {
            tracing::debug!(
                "Dropping stale page {} (generation {} < {})",
                ticket.page,
                ticket.generation,
                self.generation
            );
            return Applied::Stale;
        }

        let fetched = page.items.len();
        match ticket.kind {
            FetchKind::Reset => {
                self.items.clear();
                self.merge(page.items);
            }
            FetchKind::Append => {
                self.append_in_flight = false;
                self.merge(page.items);
            }
        }
        self.cursor.page = ticket.page;
        self.cursor.has_more = self.compute_has_more(&ticket, fetched, page.meta.as_ref());
        self.state = ListState::Loaded;
        Applied::Accepted
    }

    pub fn fail(&mut self, ticket: FetchTicket, message: impl Into<String>) -> Applied {
        if !self.is_current(&ticket) {
            return Applied::Stale;
        }
        if ticket.kind == FetchKind::Append {
            self.append_in_flight = false;
        }
        self.state = ListState::Error(message.into());
        Applied::Accepted
    }

    /// Resolves a failed reset with locally held items instead of an error.
    /// The list is then considered complete.
    pub fn complete_with_fallback(&mut self, ticket: FetchTicket, items: Vec<T>) -> Applied {
        if !self.is_current(&ticket) || ticket.kind != FetchKind::Reset {
            return Applied::Stale;
        }
        self.items.clear();
        self.merge(items);
        self.cursor.page = 1;
        self.cursor.has_more = false;
        self.state = ListState::Loaded;
        Applied::Accepted
    }

    fn compute_has_more(
        &self,
        ticket: &FetchTicket,
        fetched: usize,
        meta: Option<&crate::models::PageMeta>,
    ) -> bool {
        if fetched < ticket.page_size as usize {
            return false;
        }
        match meta {
            Some(meta) => match (meta.total_pages, meta.total) {
                (Some(total_pages), _) => ticket.page < total_pages,
                (None, Some(total)) => (self.items.len() as u64) < total,
                (None, None) => true,
            },
            None => true,
        }
    }

    /// Folds items in by id (later copies win) and re-sorts.
    fn merge(&mut self, incoming: Vec<T>) {
        for item in incoming {
            match self.items.iter().position(|existing| existing.id() == item.id()) {
                Some(pos) => self.items[pos] = item,
                None => self.items.push(item),
            }
        }
        self.sort();
    }

    fn sort(&mut self) {
        match self.order {
            SortOrder::OldestFirst => self.items.sort_by_cached_key(|item| item.created_at()),
            SortOrder::NewestFirst => {
                self.items.sort_by_cached_key(|item| Reverse(item.created_at()))
            }
            SortOrder::Server => {}
        }
    }

    /// Inserts or replaces a record after a successful mutation.
    ///
    /// New records go to the front when the list keeps server order.
    pub fn upsert(&mut self, item: T) {
        match self.items.iter().position(|existing| existing.id() == item.id()) {
            Some(pos) => self.items[pos] = item,
            None if self.order == SortOrder::Server => self.items.insert(0, item),
            None => self.items.push(item),
        }
        self.sort();
    }

    pub fn remove(&mut self, id: &ResourceId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id() != id);
        before != self.items.len()
    }

    pub fn update(&mut self, id: &ResourceId, f: impl FnOnce(&mut T)) -> bool {
        match self.items.iter_mut().find(|item| item.id() == id) {
            Some(item) => {
                f(item);
                true
            }
            None => false,
        }
    }

    pub fn find(&self, id: &ResourceId) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }
}

// ==================== Источники страниц ====================

/// Fetches one page of a collection.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    /// Filter applied to every page of a list; changing it means a reset.
    type Query: Clone + Default + Send + Sync + 'static;

    async fn fetch_page(
        &self,
        query: &Self::Query,
        page: u32,
        size: u32,
    ) -> Result<Page<T>, BlogClientError>;

    /// Shown when a fetch fails without a server message.
    fn failure_message(&self) -> &'static str {
        "Failed to load list"
    }
}

// ==================== Представление списка ====================

#[derive(Debug, Clone, PartialEq)]
pub struct ListSnapshot<T> {
    pub items: Vec<T>,
    pub cursor: PageCursor,
    pub state: ListState,
}

struct ViewInner<T, Q> {
    sync: ListSynchronizer<T>,
    query: Q,
}

/// A list view bound to its page source.
pub struct ListView<T, S: PageSource<T>> {
    inner: Mutex<ViewInner<T, S::Query>>,
    source: S,
}

impl<T, S> ListView<T, S>
where
    T: ResourceItem,
    S: PageSource<T>,
{
    pub fn new(source: S, page_size: u32, order: SortOrder) -> Self {
        Self {
            inner: Mutex::new(ViewInner {
                sync: ListSynchronizer::new(page_size, order),
                query: S::Query::default(),
            }),
            source,
        }
    }

    /// Sets the query used by the first reset.
    pub fn with_query(self, query: S::Query) -> Self {
        self.lock().query = query;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ViewInner<T, S::Query>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn query(&self) -> S::Query {
        self.lock().query.clone()
    }

    pub fn snapshot(&self) -> ListSnapshot<T> {
        let inner = self.lock();
        ListSnapshot {
            items: inner.sync.items().to_vec(),
            cursor: inner.sync.cursor(),
            state: inner.sync.state().clone(),
        }
    }

    pub fn items(&self) -> Vec<T> {
        self.lock().sync.items().to_vec()
    }

    pub fn cursor(&self) -> PageCursor {
        self.lock().sync.cursor()
    }

    pub fn state(&self) -> ListState {
        self.lock().sync.state().clone()
    }

    pub fn find(&self, id: &ResourceId) -> Option<T> {
        self.lock().sync.find(id).cloned()
    }

    /// Reloads page 1 with the current query.
    pub async fn reset(&self) -> Result<Applied, BlogClientError> {
        let (ticket, query) = {
            let mut inner = self.lock();
            (inner.sync.begin_reset(), inner.query.clone())
        };
        self.run(ticket, query).await
    }

    /// Switches to `query` and reloads page 1.
    pub async fn reset_with(&self, query: S::Query) -> Result<Applied, BlogClientError> {
        let ticket = {
            let mut inner = self.lock();
            inner.query = query.clone();
            inner.sync.begin_reset()
        };
        self.run(ticket, query).await
    }

    /// Like [`reset`](Self::reset), but a failed fetch falls back to
    /// `fallback` when one is given.
    pub async fn reset_or_fallback(
        &self,
        fallback: Option<Vec<T>>,
    ) -> Result<Applied, BlogClientError> {
        let (ticket, query) = {
            let mut inner = self.lock();
            (inner.sync.begin_reset(), inner.query.clone())
        };

        let result = self
            .source
            .fetch_page(&query, ticket.page, ticket.page_size)
            .await;
        match (result, fallback) {
            (Err(e), Some(items)) => {
                tracing::warn!("Page fetch failed ({}), using {} fallback items", e, items.len());
                Ok(self.lock().sync.complete_with_fallback(ticket, items))
            }
            (result, _) => self.finish(ticket, result),
        }
    }

    /// Fetches the next page. `Ok(None)` means no fetch was issued.
    pub async fn load_more(&self) -> Result<Option<Applied>, BlogClientError> {
        let (ticket, query) = {
            let mut inner = self.lock();
            match inner.sync.begin_append() {
                Some(ticket) => (ticket, inner.query.clone()),
                None => return Ok(None),
            }
        };
        self.run(ticket, query).await.map(Some)
    }

    /// Keeps appending until the list reports no more pages.
    pub async fn load_all(&self) -> Result<(), BlogClientError> {
        while self.load_more().await?.is_some() {}
        Ok(())
    }

    async fn run(&self, ticket: FetchTicket, query: S::Query) -> Result<Applied, BlogClientError> {
        tracing::debug!(
            "Fetching page {} ({:?}, generation {})",
            ticket.page,
            ticket.kind,
            ticket.generation
        );
        let result = self
            .source
            .fetch_page(&query, ticket.page, ticket.page_size)
            .await;
        self.finish(ticket, result)
    }

    /// Folds a fetch result in. A failure that lost to a newer fetch is
    /// reported as `Stale` rather than as an error.
    fn finish(
        &self,
        ticket: FetchTicket,
        result: Result<Page<T>, BlogClientError>,
    ) -> Result<Applied, BlogClientError> {
        match result {
            Ok(page) => Ok(self.lock().sync.complete(ticket, page)),
            Err(e) => {
                let message = e.user_message(self.source.failure_message());
                match self.lock().sync.fail(ticket, message) {
                    Applied::Stale => Ok(Applied::Stale),
                    Applied::Accepted => Err(e),
                }
            }
        }
    }

    pub fn upsert(&self, item: T) {
        self.lock().sync.upsert(item);
    }

    pub fn remove(&self, id: &ResourceId) -> bool {
        self.lock().sync.remove(id)
    }

    pub fn update(&self, id: &ResourceId, f: impl FnOnce(&mut T)) -> bool {
        self.lock().sync.update(id, f)
    }
}

// ==================== Поиск ====================

/// Collapses bursts of search input into a single settled value.
#[derive(Debug, Clone)]
pub struct SearchDebouncer {
    delay: Duration,
    latest: Arc<AtomicU64>,
}

impl SearchDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Resolves to `Some(input)` if no newer input arrived during the delay.
    pub async fn settle(&self, input: impl Into<String>) -> Option<String> {
        let input = input.into();
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        (self.latest.load(Ordering::SeqCst) == ticket).then_some(input)
    }
}
