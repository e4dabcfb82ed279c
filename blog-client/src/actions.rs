//! Resource-specific mutations that keep list and detail caches in step.

use std::sync::Arc;

use crate::detail::DetailCache;
use crate::http_client::ResourceClient;
use crate::list_sync::ListView;
use crate::models::*;
use crate::mutation::{ActionKind, ActionState, MutationCoordinator, MutationOutcome};
use crate::sources::{CommentSource, PostSource, TodoSource};
use crate::validation;

pub const PUBLISHED_DELETE_MESSAGE: &str = "Unpublish the post before deleting it";
pub const ALREADY_PUBLISHED_MESSAGE: &str = "Post is already published";
pub const NOT_PUBLISHED_MESSAGE: &str = "Post is not published";

// ==================== Посты ====================

pub struct PostActions {
    client: ResourceClient,
    coordinator: MutationCoordinator,
    detail: DetailCache<Post>,
    list: Option<Arc<ListView<Post, PostSource>>>,
}

impl PostActions {
    pub fn new(client: ResourceClient, list: Option<Arc<ListView<Post, PostSource>>>) -> Self {
        Self {
            client,
            coordinator: MutationCoordinator::new(),
            detail: DetailCache::new(),
            list,
        }
    }

    pub fn action_state(&self) -> ActionState {
        self.coordinator.state()
    }

    pub fn detail(&self) -> &DetailCache<Post> {
        &self.detail
    }

    /// Published posts cannot be deleted; the delete control stays disabled.
    pub fn can_delete(post: &Post) -> bool {
        !post.is_published
    }

    fn cached(&self, id: &ResourceId) -> Option<Post> {
        self.detail
            .get()
            .filter(|post| &post.id == id)
            .or_else(|| self.list.as_ref().and_then(|list| list.find(id)))
    }

    pub async fn open(&self, id: &ResourceId) -> Result<Post, crate::BlogClientError> {
        self.detail
            .load(self.client.get_post(id), "Failed to fetch post")
            .await
    }

    pub async fn create(&self, form: PostForm) -> MutationOutcome<Option<Post>> {
        if let Err(errors) = validation::validate_post(&form) {
            return MutationOutcome::Rejected(errors.to_string());
        }

        let outcome = self
            .coordinator
            .run(ActionKind::Create, "Failed to create post", self.client.create_post(form))
            .await;

        if outcome.is_success() {
            if let Some(list) = &self.list {
                if let Err(e) = list.reset().await {
                    tracing::warn!("Post list refresh after create failed: {}", e);
                }
            }
        }
        outcome
    }

    pub async fn update(&self, id: &ResourceId, form: PostForm) -> MutationOutcome<Post> {
        if let Err(errors) = validation::validate_post(&form) {
            return MutationOutcome::Rejected(errors.to_string());
        }

        let outcome = self
            .coordinator
            .run(ActionKind::Update, "Failed to update post", self.client.update_post(id, form))
            .await;

        if let MutationOutcome::Succeeded(post) = &outcome {
            self.detail.set(post.clone());
            if let Some(list) = &self.list {
                list.update(&post.id, |cached| *cached = post.clone());
            }
        }
        outcome
    }

    /// Publishes or unpublishes depending on `currently_published`;
    /// succeeds with the new state.
    pub async fn toggle_publish(&self, id: &ResourceId, currently_published: bool) -> MutationOutcome<bool> {
        let publish = !currently_published;
        let outcome = self
            .coordinator
            .run(ActionKind::PublishToggle, "Action failed", self.client.set_published(id, publish))
            .await
            .map(|()| publish);

        if outcome.is_success() {
            self.detail.update(id, |post| post.is_published = publish);
            if let Some(list) = &self.list {
                list.update(id, |post| post.is_published = publish);
            }
            tracing::info!("Post {} {}", id, if publish { "published" } else { "unpublished" });
        }
        outcome
    }

    /// Moves the post to the requested state. A post already in that state
    /// is rejected without a request; an uncached post is sent as is.
    pub async fn set_published(&self, id: &ResourceId, publish: bool) -> MutationOutcome<bool> {
        let currently_published = match self.cached(id) {
            Some(post) if post.is_published == publish => {
                let message = if publish {
                    ALREADY_PUBLISHED_MESSAGE
                } else {
                    NOT_PUBLISHED_MESSAGE
                };
                return MutationOutcome::Rejected(message.into());
            }
            Some(post) => post.is_published,
            None => !publish,
        };
        self.toggle_publish(id, currently_published).await
    }

    pub async fn delete(&self, id: &ResourceId) -> MutationOutcome<()> {
        if let Some(post) = self.cached(id) {
            if !Self::can_delete(&post) {
                return MutationOutcome::Rejected(PUBLISHED_DELETE_MESSAGE.into());
            }
        }

        let outcome = self
            .coordinator
            .run(ActionKind::Delete, "Failed to delete post", self.client.delete_post(id))
            .await;

        if outcome.is_success() {
            self.detail.clear_if(id);
            if let Some(list) = &self.list {
                list.remove(id);
            }
        }
        outcome
    }
}

// ==================== Комментарии ====================

pub struct CommentActions {
    client: ResourceClient,
    coordinator: MutationCoordinator,
    thread: Arc<ListView<Comment, CommentSource>>,
}

impl CommentActions {
    pub fn new(client: ResourceClient, thread: Arc<ListView<Comment, CommentSource>>) -> Self {
        Self {
            client,
            coordinator: MutationCoordinator::new(),
            thread,
        }
    }

    pub fn action_state(&self) -> ActionState {
        self.coordinator.state()
    }

    fn post_id(&self) -> &ResourceId {
        self.thread.source().post_id()
    }

    /// Any comment mutation can reshape the server's pages, so the thread
    /// goes back to page 1.
    async fn refresh(&self) {
        if let Err(e) = self.thread.reset().await {
            tracing::warn!("Comment thread refresh failed: {}", e);
        }
    }

    pub async fn create(&self, content: &str) -> MutationOutcome<Option<Comment>> {
        if let Err(errors) = validation::validate_comment(content) {
            return MutationOutcome::Rejected(errors.to_string());
        }
        let outcome = self
            .coordinator
            .run(
                ActionKind::Create,
                "Failed to add comment",
                self.client.create_comment(self.post_id(), content),
            )
            .await;
        if outcome.is_success() {
            self.refresh().await;
        }
        outcome
    }

    pub async fn update(&self, comment_id: &ResourceId, content: &str) -> MutationOutcome<Option<Comment>> {
        if let Err(errors) = validation::validate_comment(content) {
            return MutationOutcome::Rejected(errors.to_string());
        }
        let outcome = self
            .coordinator
            .run(
                ActionKind::Update,
                "Failed to update comment",
                self.client.update_comment(self.post_id(), comment_id, content),
            )
            .await;
        if outcome.is_success() {
            self.refresh().await;
        }
        outcome
    }

    pub async fn delete(&self, comment_id: &ResourceId) -> MutationOutcome<()> {
        let outcome = self
            .coordinator
            .run(
                ActionKind::Delete,
                "Failed to delete comment",
                self.client.delete_comment(self.post_id(), comment_id),
            )
            .await;
        if outcome.is_success() {
            self.refresh().await;
        }
        outcome
    }
}

// ==================== Задачи ====================

pub struct TodoActions {
    client: ResourceClient,
    coordinator: MutationCoordinator,
    list: Arc<ListView<Todo, TodoSource>>,
}

impl TodoActions {
    pub fn new(client: ResourceClient, list: Arc<ListView<Todo, TodoSource>>) -> Self {
        Self {
            client,
            coordinator: MutationCoordinator::new(),
            list,
        }
    }

    pub fn action_state(&self) -> ActionState {
        self.coordinator.state()
    }

    pub async fn create(&self, input: TodoInput) -> MutationOutcome<Todo> {
        if let Err(errors) = validation::validate_todo(&input.todo) {
            return MutationOutcome::Rejected(errors.to_string());
        }
        let outcome = self
            .coordinator
            .run(ActionKind::Create, "Failed to create todo", self.client.create_todo(&input))
            .await;
        if let MutationOutcome::Succeeded(todo) = &outcome {
            self.list.upsert(todo.clone());
        }
        outcome
    }

    pub async fn update(&self, id: &ResourceId, patch: TodoPatch) -> MutationOutcome<Todo> {
        if let Some(todo) = &patch.todo {
            if let Err(errors) = validation::validate_todo(todo) {
                return MutationOutcome::Rejected(errors.to_string());
            }
        }
        let outcome = self
            .coordinator
            .run(ActionKind::Update, "Failed to update todo", self.client.update_todo(id, &patch))
            .await;
        if let MutationOutcome::Succeeded(todo) = &outcome {
            self.list.upsert(todo.clone());
        }
        outcome
    }

    /// Flips a cached todo between completed and not started.
    pub async fn toggle(&self, id: &ResourceId) -> MutationOutcome<Todo> {
        let Some(current) = self.list.find(id) else {
            return MutationOutcome::Rejected(format!("Todo {} is not loaded", id));
        };
        let patch = TodoPatch {
            todo: None,
            status: Some(current.status.toggled()),
        };
        self.update(id, patch).await
    }

    pub async fn delete(&self, id: &ResourceId) -> MutationOutcome<()> {
        let outcome = self
            .coordinator
            .run(ActionKind::Delete, "Failed to delete todo", self.client.delete_todo(id))
            .await;
        if outcome.is_success() {
            self.list.remove(id);
        }
        outcome
    }
}
