use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::BlogClientError;
use crate::models::{ResourceId, ResourceItem};

#[derive(Debug, Clone, PartialEq)]
pub struct DetailState<T> {
    pub current: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> Default for DetailState<T> {
    fn default() -> Self {
        Self {
            current: None,
            loading: false,
            error: None,
        }
    }
}

/// Cached copy of the record a detail view is showing.
#[derive(Debug, Clone)]
pub struct DetailCache<T> {
    state: Arc<Mutex<DetailState<T>>>,
}

impl<T> Default for DetailCache<T> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(DetailState::default())),
        }
    }
}

impl<T: ResourceItem> DetailCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DetailState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> DetailState<T> {
        self.lock().clone()
    }

    pub fn get(&self) -> Option<T> {
        self.lock().current.clone()
    }

    pub fn holds(&self, id: &ResourceId) -> bool {
        self.lock()
            .current
            .as_ref()
            .is_some_and(|item| item.id() == id)
    }

    /// Runs `fetch` and stores its result as the current record.
    pub async fn load<F>(&self, fetch: F, fallback: &str) -> Result<T, BlogClientError>
    where
        F: Future<Output = Result<T, BlogClientError>>,
    {
        {
            let mut state = self.lock();
            state.loading = true;
            state.error = None;
        }

        let result = fetch.await;
        let mut state = self.lock();
        state.loading = false;
        match &result {
            Ok(item) => state.current = Some(item.clone()),
            Err(e) => state.error = Some(e.user_message(fallback)),
        }
        result
    }

    pub fn set(&self, item: T) {
        self.lock().current = Some(item);
    }

    /// Applies `f` when the cached record has the given id.
    pub fn update(&self, id: &ResourceId, f: impl FnOnce(&mut T)) -> bool {
        match self.lock().current.as_mut() {
            Some(item) if item.id() == id => {
                f(item);
                true
            }
            _ => false,
        }
    }

    pub fn clear_if(&self, id: &ResourceId) -> bool {
        let mut state = self.lock();
        if state.current.as_ref().is_some_and(|item| item.id() == id) {
            state.current = None;
            true
        } else {
            false
        }
    }

    pub fn clear(&self) {
        *self.lock() = DetailState::default();
    }
}
