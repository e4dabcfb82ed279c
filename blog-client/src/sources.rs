use async_trait::async_trait;

use crate::error::BlogClientError;
use crate::http_client::ResourceClient;
use crate::list_sync::PageSource;
use crate::models::{Comment, Page, PageMeta, Post, PostFilter, ResourceId, Todo};

/// Comments are fetched five at a time.
pub const COMMENT_PAGE_SIZE: u32 = 5;

#[derive(Debug, Clone)]
pub struct PostSource {
    client: ResourceClient,
}

impl PostSource {
    pub fn new(client: ResourceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageSource<Post> for PostSource {
    type Query = PostFilter;

    async fn fetch_page(
        &self,
        query: &PostFilter,
        page: u32,
        size: u32,
    ) -> Result<Page<Post>, BlogClientError> {
        self.client.list_posts(page, size, query).await
    }

    fn failure_message(&self) -> &'static str {
        "Failed to fetch posts"
    }
}

#[derive(Debug, Clone)]
pub struct CommentSource {
    client: ResourceClient,
    post_id: ResourceId,
}

impl CommentSource {
    pub fn new(client: ResourceClient, post_id: ResourceId) -> Self {
        Self { client, post_id }
    }

    pub fn post_id(&self) -> &ResourceId {
        &self.post_id
    }
}

#[async_trait]
impl PageSource<Comment> for CommentSource {
    type Query = ();

    async fn fetch_page(
        &self,
        _query: &(),
        page: u32,
        size: u32,
    ) -> Result<Page<Comment>, BlogClientError> {
        self.client.list_comments(&self.post_id, page, size).await
    }

    fn failure_message(&self) -> &'static str {
        "Failed to fetch comments"
    }
}

/// The todo endpoint returns the whole collection in one response.
#[derive(Debug, Clone)]
pub struct TodoSource {
    client: ResourceClient,
}

impl TodoSource {
    pub fn new(client: ResourceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageSource<Todo> for TodoSource {
    type Query = ();

    async fn fetch_page(&self, _query: &(), page: u32, _size: u32) -> Result<Page<Todo>, BlogClientError> {
        let items = if page == 1 {
            self.client.list_todos().await?
        } else {
            Vec::new()
        };
        let meta = PageMeta {
            total: Some(items.len() as u64),
            page: Some(1),
            size: Some(items.len() as u32),
            total_pages: Some(1),
        };
        Ok(Page::with_meta(items, meta))
    }

    fn failure_message(&self) -> &'static str {
        "Unable to fetch todos"
    }
}
