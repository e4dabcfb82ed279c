//! Single-flight mutation tracking per view.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::BlogClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    PublishToggle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionState {
    pub loading: bool,
    pub kind: Option<ActionKind>,
    pub error: Option<String>,
}

/// Typed result of a mutation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<T> {
    Succeeded(T),
    /// The request failed; carries the user-facing message.
    Failed(String),
    /// Another mutation was already in flight for this view.
    Blocked,
    /// Refused locally before anything was sent.
    Rejected(String),
}

impl<T> MutationOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, MutationOutcome::Succeeded(_))
    }

    pub fn succeeded(self) -> Option<T> {
        match self {
            MutationOutcome::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> MutationOutcome<U> {
        match self {
            MutationOutcome::Succeeded(value) => MutationOutcome::Succeeded(f(value)),
            MutationOutcome::Failed(message) => MutationOutcome::Failed(message),
            MutationOutcome::Blocked => MutationOutcome::Blocked,
            MutationOutcome::Rejected(message) => MutationOutcome::Rejected(message),
        }
    }

    /// Message to show the user, if the attempt did not succeed.
    pub fn message(&self) -> Option<&str> {
        match self {
            MutationOutcome::Failed(message) | MutationOutcome::Rejected(message) => Some(message),
            MutationOutcome::Blocked => Some("Another action is still in progress"),
            MutationOutcome::Succeeded(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MutationCoordinator {
    state: Arc<Mutex<ActionState>>,
}

/// Resets the action state if a running mutation is dropped mid-flight.
struct InFlight<'a> {
    coordinator: &'a MutationCoordinator,
    finished: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self.coordinator.lock();
            state.loading = false;
            state.kind = None;
        }
    }
}

impl MutationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ActionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ActionState {
        self.lock().clone()
    }

    /// True while a mutation is in flight; controls should be disabled.
    pub fn is_busy(&self) -> bool {
        self.lock().loading
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    fn try_begin(&self, kind: ActionKind) -> Option<InFlight<'_>> {
        let mut state = self.lock();
        if state.loading {
            return None;
        }
        *state = ActionState {
            loading: true,
            kind: Some(kind),
            error: None,
        };
        Some(InFlight {
            coordinator: self,
            finished: false,
        })
    }

    /// Dispatches `request` unless another mutation holds the view.
    ///
    /// `request` is only polled after the view has been claimed, so a
    /// blocked call never reaches the network.
    pub async fn run<T, F>(&self, kind: ActionKind, fallback: &str, request: F) -> MutationOutcome<T>
    where
        F: Future<Output = Result<T, BlogClientError>>,
    {
        let Some(mut flight) = self.try_begin(kind) else {
            tracing::debug!("Ignoring {:?}: another mutation is in flight", kind);
            return MutationOutcome::Blocked;
        };

        let result = request.await;
        flight.finished = true;

        let mut state = self.lock();
        match result {
            Ok(value) => {
                *state = ActionState::default();
                MutationOutcome::Succeeded(value)
            }
            Err(e) => {
                let message = e.user_message(fallback);
                tracing::warn!("{:?} failed: {}", kind, e);
                *state = ActionState {
                    loading: false,
                    kind: None,
                    error: Some(message.clone()),
                };
                MutationOutcome::Failed(message)
            }
        }
    }
}
