use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::BlogClientError;
use crate::models::*;
use crate::session::SessionContext;

/// Authenticated HTTP access to the blog and todo APIs.
///
/// Every request picks up the bearer token from the shared
/// [`SessionContext`]; failures never touch the session.
#[derive(Debug, Clone)]
pub struct ResourceClient {
    client: Client,
    base_url: String,
    session: SessionContext,
    online: Arc<AtomicBool>,
}

impl ResourceClient {
    pub fn new(config: &ClientConfig, session: SessionContext) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.base_url.clone(),
            session,
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Records the connectivity state reported by the host environment.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn add_auth_header(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }
        request
    }

    fn is_network_failure(err: &reqwest::Error) -> bool {
        err.is_connect() || err.is_timeout() || err.is_request()
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BlogClientError> {
        if !self.is_online() {
            return Err(BlogClientError::Offline);
        }

        match self.add_auth_header(request).send().await {
            Ok(response) => Ok(response),
            Err(e) if Self::is_network_failure(&e) => {
                tracing::debug!("Network failure: {}", e);
                Err(BlogClientError::Offline)
            }
            Err(e) => Err(BlogClientError::Http(e)),
        }
    }

    async fn read_body(response: Response) -> Result<String, BlogClientError> {
        response.text().await.map_err(|e| {
            if Self::is_network_failure(&e) || e.is_body() {
                BlogClientError::Offline
            } else {
                BlogClientError::Http(e)
            }
        })
    }

    async fn check_status(response: Response) -> Result<Response, BlogClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = Self::read_body(response).await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .ok()
            .and_then(|e| e.message)
            .filter(|m| !m.is_empty());
        tracing::debug!("Request failed with {}: {:?}", status, message);

        match (status, message) {
            (StatusCode::UNAUTHORIZED, message) => {
                Err(BlogClientError::Unauthorized(message.unwrap_or_default()))
            }
            (StatusCode::NOT_FOUND, None) => Err(BlogClientError::NotFound),
            (status, message) => Err(BlogClientError::Server {
                status: status.as_u16(),
                message,
            }),
        }
    }

    async fn execute_value(&self, request: RequestBuilder) -> Result<Value, BlogClientError> {
        let response = Self::check_status(self.send(request).await?).await?;
        let body = Self::read_body(response).await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BlogClientError> {
        let value = self.execute_value(request).await?;
        Ok(serde_json::from_value(unwrap_data(value))?)
    }

    async fn execute_page<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Page<T>, BlogClientError> {
        let value = self.execute_value(request).await?;
        into_page(value)
    }

    // ==================== Аутентификация ====================

    pub async fn login(&self, req: &LoginRequest) -> Result<(String, UserProfile), BlogClientError> {
        let url = self.url("/auth/login");
        tracing::debug!("Sending login request for {}", req.email);
        let request = self
            .client
            .post(&url)
            .header("X-Requested-With", "XMLHttpRequest")
            .json(req);

        let value = match self.execute_value(request).await {
            Ok(value) => value,
            Err(BlogClientError::Server { status: 500, .. }) => {
                return Err(BlogClientError::Server {
                    status: 500,
                    message: Some("Email is not registered".into()),
                })
            }
            Err(BlogClientError::Server { status, message }) => {
                return Err(BlogClientError::Server {
                    status,
                    message: message.or_else(|| Some("Invalid email or password".into())),
                })
            }
            Err(BlogClientError::Unauthorized(message)) => {
                let message = if message.is_empty() {
                    "Invalid email or password".to_string()
                } else {
                    message
                };
                return Err(BlogClientError::Unauthorized(message));
            }
            Err(e) => return Err(e),
        };

        extract_auth(value)
    }

    pub async fn signup(&self, req: &SignupRequest) -> Result<(String, UserProfile), BlogClientError> {
        let url = self.url("/auth/signup");
        tracing::debug!("Sending signup request for {}", req.email);
        let request = self
            .client
            .post(&url)
            .header("X-Requested-With", "XMLHttpRequest")
            .json(req);

        let value = self.execute_value(request).await.map_err(|e| match e {
            BlogClientError::Server { status, message } => BlogClientError::Server {
                status,
                message: message.or_else(|| Some("Signup failed".into())),
            },
            other => other,
        })?;
        extract_auth(value)
    }

    pub async fn fetch_user(&self) -> Result<UserProfile, BlogClientError> {
        let value = self.execute_value(self.client.get(self.url("/user"))).await?;
        extract_user(value)
    }

    pub async fn update_user(&self, form: ProfileForm) -> Result<UserProfile, BlogClientError> {
        let mut multipart = Form::new()
            .text("first_name", form.first_name)
            .text("last_name", form.last_name);
        if let Some(image) = form.image {
            multipart = multipart.part("file", image_part(image)?);
        }

        let request = self.client.put(self.url("/user")).multipart(multipart);
        let value = self.execute_value(request).await?;
        extract_user(value)
    }

    // ==================== Посты ====================

    pub async fn list_posts(
        &self,
        page: u32,
        size: u32,
        filter: &PostFilter,
    ) -> Result<Page<Post>, BlogClientError> {
        let mut params = vec![("page", page.to_string()), ("size", size.to_string())];
        if let Some(search) = &filter.search {
            params.push(("search", search.clone()));
        }
        if let Some(published) = filter.is_published {
            params.push(("is_published", published.to_string()));
        }

        tracing::debug!("Listing posts: {:?}", params);
        let request = self.client.get(self.url("/posts")).query(&params);
        self.execute_page(request).await
    }

    pub async fn get_post(&self, id: &ResourceId) -> Result<Post, BlogClientError> {
        let request = self
            .client
            .get(self.url(&format!("/posts/{}", id)))
            .query(&[("t", cache_buster())]);
        self.execute(request).await
    }

    /// The create endpoint does not promise to echo the record back.
    pub async fn create_post(&self, form: PostForm) -> Result<Option<Post>, BlogClientError> {
        let request = self
            .client
            .post(self.url("/posts/create"))
            .multipart(post_form(form)?);
        let value = self.execute_value(request).await?;
        Ok(serde_json::from_value(unwrap_data(value)).ok())
    }

    pub async fn update_post(&self, id: &ResourceId, form: PostForm) -> Result<Post, BlogClientError> {
        let request = self
            .client
            .put(self.url(&format!("/posts/{}", id)))
            .multipart(post_form(form)?);
        self.execute(request).await
    }

    pub async fn delete_post(&self, id: &ResourceId) -> Result<(), BlogClientError> {
        let request = self.client.delete(self.url(&format!("/posts/{}", id)));
        self.execute_value(request).await?;
        Ok(())
    }

    pub async fn set_published(&self, id: &ResourceId, publish: bool) -> Result<(), BlogClientError> {
        let action = if publish { "publish" } else { "unpublish" };
        let request = self.client.patch(self.url(&format!("/posts/{}/{}", id, action)));
        self.execute_value(request).await?;
        Ok(())
    }

    // ==================== Комментарии ====================

    pub async fn list_comments(
        &self,
        post_id: &ResourceId,
        page: u32,
        size: u32,
    ) -> Result<Page<Comment>, BlogClientError> {
        let request = self
            .client
            .get(self.url(&format!("/posts/{}/comments", post_id)))
            .query(&[
                ("page", page.to_string()),
                ("size", size.to_string()),
                ("t", cache_buster()),
                ("sort", "desc".to_string()),
            ]);
        self.execute_page(request).await
    }

    pub async fn create_comment(
        &self,
        post_id: &ResourceId,
        content: &str,
    ) -> Result<Option<Comment>, BlogClientError> {
        let request = self
            .client
            .post(self.url(&format!("/posts/{}/comments", post_id)))
            .json(&CommentRequest {
                content: content.trim().to_string(),
            });
        let value = self.execute_value(request).await?;
        Ok(serde_json::from_value(unwrap_data(value)).ok())
    }

    pub async fn update_comment(
        &self,
        post_id: &ResourceId,
        comment_id: &ResourceId,
        content: &str,
    ) -> Result<Option<Comment>, BlogClientError> {
        let request = self
            .client
            .put(self.url(&format!("/posts/{}/comments/{}", post_id, comment_id)))
            .json(&CommentRequest {
                content: content.trim().to_string(),
            });
        let value = self.execute_value(request).await?;
        Ok(serde_json::from_value(unwrap_data(value)).ok())
    }

    pub async fn delete_comment(
        &self,
        post_id: &ResourceId,
        comment_id: &ResourceId,
    ) -> Result<(), BlogClientError> {
        let request = self
            .client
            .delete(self.url(&format!("/posts/{}/comments/{}", post_id, comment_id)));
        self.execute_value(request).await?;
        Ok(())
    }

    // ==================== Задачи ====================

    pub async fn list_todos(&self) -> Result<Vec<Todo>, BlogClientError> {
        let page: Page<Todo> = self.execute_page(self.client.get(self.url("/todos"))).await?;
        Ok(page.items)
    }

    pub async fn create_todo(&self, input: &TodoInput) -> Result<Todo, BlogClientError> {
        let request = self.client.post(self.url("/todos")).json(input);
        self.execute(request).await
    }

    pub async fn update_todo(&self, id: &ResourceId, patch: &TodoPatch) -> Result<Todo, BlogClientError> {
        let request = self
            .client
            .patch(self.url(&format!("/todos/{}", id)))
            .json(patch);
        self.execute(request).await
    }

    pub async fn delete_todo(&self, id: &ResourceId) -> Result<(), BlogClientError> {
        let request = self.client.delete(self.url(&format!("/todos/{}", id)));
        self.execute_value(request).await?;
        Ok(())
    }
}

fn cache_buster() -> String {
    Utc::now().timestamp_millis().to_string()
}

fn image_part(image: ImageUpload) -> Result<Part, BlogClientError> {
    Ok(Part::bytes(image.bytes)
        .file_name(image.file_name)
        .mime_str(&image.mime)?)
}

fn post_form(form: PostForm) -> Result<Form, BlogClientError> {
    let mut multipart = Form::new()
        .text("title", form.title)
        .text("content", form.content);
    if let Some(image) = form.image {
        multipart = multipart.part("file", image_part(image)?);
    }
    Ok(multipart)
}

/// Returns the `data` member of an `{data: ...}` envelope, or the value itself.
pub(crate) fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

pub(crate) fn into_page<T: DeserializeOwned>(value: Value) -> Result<Page<T>, BlogClientError> {
    match value {
        Value::Object(mut map) => {
            let meta = map
                .remove("meta")
                .and_then(|m| serde_json::from_value::<PageMeta>(m).ok());
            let items = match map.remove("data") {
                Some(Value::Array(items)) => serde_json::from_value(Value::Array(items))?,
                Some(Value::Null) | None => Vec::new(),
                Some(other) => {
                    return Err(BlogClientError::Serialization(format!(
                        "expected a list in `data`, got {other}"
                    )))
                }
            };
            Ok(Page { items, meta })
        }
        Value::Array(items) => Ok(Page::new(serde_json::from_value(Value::Array(items))?)),
        Value::Null => Ok(Page::new(Vec::new())),
        other => Err(BlogClientError::Serialization(format!(
            "expected a list response, got {other}"
        ))),
    }
}

fn extract_user(value: Value) -> Result<UserProfile, BlogClientError> {
    let candidate = match value {
        Value::Object(mut map) => match map.remove("user") {
            Some(user) => user,
            None => match map.remove("data") {
                Some(Value::Object(mut data)) => data
                    .remove("user")
                    .or_else(|| data.remove("details"))
                    .unwrap_or(Value::Object(data)),
                Some(other) => other,
                None => Value::Object(map),
            },
        },
        other => other,
    };
    Ok(serde_json::from_value(candidate)?)
}

/// Pulls the token and user out of a login or signup body.
///
/// Login answers `{data: {token, details}}`; signup puts the user fields
/// next to the token inside `data`.
fn extract_auth(value: Value) -> Result<(String, UserProfile), BlogClientError> {
    let Value::Object(mut data) = unwrap_data(value) else {
        return Err(BlogClientError::MissingCredentials);
    };

    let token = match data.remove("token") {
        Some(Value::String(token)) if !token.is_empty() => token,
        _ => return Err(BlogClientError::MissingCredentials),
    };

    let user = data
        .remove("details")
        .or_else(|| data.remove("user"))
        .unwrap_or(Value::Object(data));
    let user = serde_json::from_value(user).map_err(|_| BlogClientError::MissingCredentials)?;
    Ok((token, user))
}
