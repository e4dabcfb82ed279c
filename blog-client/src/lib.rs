pub mod actions;
pub mod auth;
pub mod config;
pub mod detail;
pub mod error;
pub mod http_client;
pub mod list_sync;
pub mod models;
pub mod mutation;
pub mod session;
pub mod sources;
pub mod validation;

use std::sync::Arc;

use chrono::Utc;

pub use actions::{CommentActions, PostActions, TodoActions};
pub use auth::AuthService;
pub use config::ClientConfig;
pub use error::{BlogClientError, OFFLINE_MESSAGE};
pub use http_client::ResourceClient;
pub use list_sync::{ListState, ListView, PageCursor, SearchDebouncer, SortOrder};
pub use mutation::{ActionKind, ActionState, MutationOutcome};
pub use session::{GuardOutcome, Session, SessionContext, SessionStore};

use models::{Comment, Post, PostFilter, ResourceId, Todo};
use sources::{CommentSource, PostSource, TodoSource, COMMENT_PAGE_SIZE};

/// Entry point that restores the session and hands out views bound to it.
#[derive(Debug, Clone)]
pub struct BlogClient {
    config: ClientConfig,
    http: ResourceClient,
}

impl BlogClient {
    /// Runs the session guard against `store` before anything else.
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn SessionStore>,
    ) -> Result<(Self, GuardOutcome), BlogClientError> {
        config.validate()?;
        let (session, outcome) = SessionContext::restore(store, Utc::now());
        let http = ResourceClient::new(&config, session);
        Ok((Self { config, http }, outcome))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionContext {
        self.http.session()
    }

    pub fn http(&self) -> &ResourceClient {
        &self.http
    }

    pub fn auth(&self) -> AuthService {
        AuthService::new(self.http.clone())
    }

    pub fn posts(&self, filter: PostFilter) -> Arc<ListView<Post, PostSource>> {
        let view = ListView::new(
            PostSource::new(self.http.clone()),
            self.config.page_size,
            SortOrder::Server,
        );
        Arc::new(view.with_query(filter))
    }

    pub fn post_actions(&self, list: Option<Arc<ListView<Post, PostSource>>>) -> PostActions {
        PostActions::new(self.http.clone(), list)
    }

    /// `order` is `OldestFirst` for reading a thread and `NewestFirst` for a feed.
    pub fn comments(&self, post_id: ResourceId, order: SortOrder) -> Arc<ListView<Comment, CommentSource>> {
        Arc::new(ListView::new(
            CommentSource::new(self.http.clone(), post_id),
            COMMENT_PAGE_SIZE,
            order,
        ))
    }

    pub fn comment_actions(&self, thread: Arc<ListView<Comment, CommentSource>>) -> CommentActions {
        CommentActions::new(self.http.clone(), thread)
    }

    pub fn todos(&self) -> Arc<ListView<Todo, TodoSource>> {
        Arc::new(ListView::new(
            TodoSource::new(self.http.clone()),
            self.config.page_size,
            SortOrder::Server,
        ))
    }

    pub fn todo_actions(&self, list: Arc<ListView<Todo, TodoSource>>) -> TodoActions {
        TodoActions::new(self.http.clone(), list)
    }

    pub fn search_debouncer(&self) -> SearchDebouncer {
        SearchDebouncer::new(self.config.search_debounce)
    }
}
