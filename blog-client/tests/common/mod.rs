//! In-process mock of the blog and todo REST APIs.
//!
//! Serves on a random local port; tests inspect and tweak [`MockState`]
//! through the returned handle.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use blog_client::session::MemorySessionStore;
use blog_client::{BlogClient, ClientConfig, GuardOutcome};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const PASSWORD: &str = "Secret1!";
pub const EMAIL: &str = "ada@example.com";
pub const TOKEN: &str = "t1";

#[derive(Debug, Default)]
pub struct MockState {
    pub posts: Vec<Value>,
    pub comments: HashMap<i64, Vec<Value>>,
    pub todos: Vec<Value>,
    pub fail_comments: bool,
    pub fail_todos: bool,
    pub comment_delay: Option<Duration>,
    pub todo_delay: Option<Duration>,
    pub requests: Vec<String>,
    pub auth_headers: Vec<Option<String>>,
    pub user: Value,
    next_id: i64,
}

pub type Shared = Arc<Mutex<MockState>>;

impl MockState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, line: String, headers: &HeaderMap) {
        self.requests.push(line);
        self.auth_headers.push(
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.requests.iter().filter(|r| r.starts_with(prefix)).count()
    }
}

pub fn timestamp(n: i64) -> String {
    let base = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
    (base + chrono::Duration::minutes(n)).to_rfc3339()
}

pub fn post_json(id: i64, title: &str, published: bool) -> Value {
    json!({
        "id": id,
        "title": title,
        "content": format!("Content of {title}"),
        "img_url": format!("https://cdn.example.com/{id}.png"),
        "is_published": published,
        "createdAt": timestamp(id),
        "updatedAt": timestamp(id),
    })
}

pub fn comment_json(id: i64, minute: i64, content: &str) -> Value {
    json!({
        "id": id,
        "content": content,
        "createdAt": timestamp(minute),
        "user": {"first_name": "Ada"},
    })
}

fn error(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "message": message })))
}

type Reply = Result<Json<Value>, (StatusCode, Json<Value>)>;

#[derive(Deserialize)]
struct Login {
    email: String,
    password: String,
}

async fn login(State(db): State<Shared>, headers: HeaderMap, Json(body): Json<Login>) -> Reply {
    let mut db = db.lock().unwrap();
    db.record("POST /auth/login".into(), &headers);
    if body.email != EMAIL {
        return Err(error(StatusCode::INTERNAL_SERVER_ERROR, "user lookup failed"));
    }
    if body.password != PASSWORD {
        return Err(error(StatusCode::UNAUTHORIZED, "Invalid email or password"));
    }
    Ok(Json(json!({ "data": { "token": TOKEN, "details": db.user.clone() } })))
}

async fn signup(State(db): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    let mut db = db.lock().unwrap();
    db.record("POST /auth/signup".into(), &headers);
    if body["email"] == EMAIL {
        return Err(error(StatusCode::CONFLICT, "Email already registered"));
    }
    Ok(Json(json!({
        "data": {
            "token": "t-signup",
            "id": 2,
            "first_name": body["first_name"],
            "last_name": body["last_name"],
            "email": body["email"],
            "img_url": null,
            "is_active": true,
        }
    })))
}

async fn get_user(State(db): State<Shared>, headers: HeaderMap) -> Reply {
    let mut db = db.lock().unwrap();
    db.record("GET /user".into(), &headers);
    if headers.get("authorization").is_none() {
        return Err(error(StatusCode::UNAUTHORIZED, "Missing token"));
    }
    Ok(Json(json!({ "data": { "user": db.user.clone() } })))
}

async fn read_form(mut multipart: Multipart) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            fields.insert(name, file_name);
        } else {
            fields.insert(name, field.text().await.unwrap_or_default());
        }
    }
    fields
}

async fn put_user(State(db): State<Shared>, headers: HeaderMap, multipart: Multipart) -> Reply {
    let fields = read_form(multipart).await;
    let mut db = db.lock().unwrap();
    db.record("PUT /user".into(), &headers);
    db.user["first_name"] = json!(fields.get("first_name"));
    db.user["last_name"] = json!(fields.get("last_name"));
    Ok(Json(json!({ "data": db.user.clone() })))
}

#[derive(Deserialize)]
struct ListParams {
    page: Option<usize>,
    size: Option<usize>,
    search: Option<String>,
    is_published: Option<bool>,
}

fn paginate(items: Vec<Value>, page: usize, size: usize) -> Value {
    let total = items.len();
    let total_pages = total.div_ceil(size);
    let data: Vec<Value> = items.into_iter().skip((page - 1) * size).take(size).collect();
    json!({
        "data": data,
        "meta": { "total": total, "page": page, "size": size, "totalPages": total_pages }
    })
}

async fn list_posts(
    State(db): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Json<Value> {
    let mut db = db.lock().unwrap();
    let page = params.page.unwrap_or(1);
    let size = params.size.unwrap_or(10);
    db.record(
        format!(
            "GET /posts page={page} size={size} search={}",
            params.search.clone().unwrap_or_default()
        ),
        &headers,
    );
    let search = params.search.unwrap_or_default().to_lowercase();
    let items: Vec<Value> = db
        .posts
        .iter()
        .filter(|p| {
            p["title"]
                .as_str()
                .unwrap_or_default()
                .to_lowercase()
                .contains(&search)
        })
        .filter(|p| params.is_published.map_or(true, |want| p["is_published"] == want))
        .cloned()
        .collect();
    Json(paginate(items, page, size))
}

fn find_post(db: &MockState, id: i64) -> Option<usize> {
    db.posts.iter().position(|p| p["id"] == id)
}

async fn get_post(State(db): State<Shared>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    let mut db = db.lock().unwrap();
    db.record(format!("GET /posts/{id}"), &headers);
    match find_post(&db, id) {
        Some(pos) => {
            let mut post = db.posts[pos].clone();
            post["comments"] = json!(db.comments.get(&id).cloned().unwrap_or_default());
            Ok(Json(json!({ "data": post })))
        }
        None => Err(error(StatusCode::NOT_FOUND, "Post not found")),
    }
}

async fn create_post(State(db): State<Shared>, headers: HeaderMap, multipart: Multipart) -> Reply {
    let fields = read_form(multipart).await;
    let mut db = db.lock().unwrap();
    db.record("POST /posts/create".into(), &headers);
    let id = db.next_id();
    let mut post = post_json(id, fields.get("title").map(String::as_str).unwrap_or(""), false);
    post["content"] = json!(fields.get("content"));
    db.posts.insert(0, post.clone());
    Ok(Json(json!({ "message": "created", "data": post })))
}

async fn update_post(
    State(db): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Reply {
    let fields = read_form(multipart).await;
    let mut db = db.lock().unwrap();
    db.record(format!("PUT /posts/{id}"), &headers);
    let pos = find_post(&db, id).ok_or_else(|| error(StatusCode::NOT_FOUND, "Post not found"))?;
    db.posts[pos]["title"] = json!(fields.get("title"));
    db.posts[pos]["content"] = json!(fields.get("content"));
    Ok(Json(json!({ "data": db.posts[pos].clone() })))
}

async fn delete_post(State(db): State<Shared>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    let mut db = db.lock().unwrap();
    db.record(format!("DELETE /posts/{id}"), &headers);
    let pos = find_post(&db, id).ok_or_else(|| error(StatusCode::NOT_FOUND, "Post not found"))?;
    if db.posts[pos]["is_published"] == true {
        return Err(error(StatusCode::BAD_REQUEST, "Published posts cannot be deleted"));
    }
    db.posts.remove(pos);
    Ok(Json(json!({ "message": "Post deleted" })))
}

async fn set_published(db: Shared, headers: HeaderMap, id: i64, publish: bool) -> Reply {
    let mut db = db.lock().unwrap();
    let action = if publish { "publish" } else { "unpublish" };
    db.record(format!("PATCH /posts/{id}/{action}"), &headers);
    let pos = find_post(&db, id).ok_or_else(|| error(StatusCode::NOT_FOUND, "Post not found"))?;
    db.posts[pos]["is_published"] = json!(publish);
    Ok(Json(json!({ "message": "ok" })))
}

async fn publish(State(db): State<Shared>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    set_published(db, headers, id, true).await
}

async fn unpublish(State(db): State<Shared>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    set_published(db, headers, id, false).await
}

async fn list_comments(
    State(db): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(params): Query<ListParams>,
) -> Reply {
    let page = params.page.unwrap_or(1);
    let size = params.size.unwrap_or(5);
    let delay = {
        let mut db = db.lock().unwrap();
        db.record(format!("GET /posts/{id}/comments page={page}"), &headers);
        if db.fail_comments {
            return Err(error(StatusCode::INTERNAL_SERVER_ERROR, "comments unavailable"));
        }
        db.comment_delay
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let db = db.lock().unwrap();
    let mut items = db.comments.get(&id).cloned().unwrap_or_default();
    items.sort_by(|a, b| b["createdAt"].as_str().cmp(&a["createdAt"].as_str()));
    Ok(Json(paginate(items, page, size)))
}

async fn create_comment(
    State(db): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Reply {
    let mut db = db.lock().unwrap();
    db.record(format!("POST /posts/{id}/comments"), &headers);
    let comment_id = db.next_id();
    let comment = comment_json(comment_id, 1000 + comment_id, body["content"].as_str().unwrap_or(""));
    db.comments.entry(id).or_default().push(comment.clone());
    Ok(Json(json!({ "data": comment })))
}

async fn update_comment(
    State(db): State<Shared>,
    headers: HeaderMap,
    Path((id, comment_id)): Path<(i64, i64)>,
    Json(body): Json<Value>,
) -> Reply {
    let mut db = db.lock().unwrap();
    db.record(format!("PUT /posts/{id}/comments/{comment_id}"), &headers);
    let comments = db.comments.entry(id).or_default();
    let comment = comments
        .iter_mut()
        .find(|c| c["id"] == comment_id)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Comment not found"))?;
    comment["content"] = body["content"].clone();
    Ok(Json(json!({ "data": comment.clone() })))
}

async fn delete_comment(
    State(db): State<Shared>,
    headers: HeaderMap,
    Path((id, comment_id)): Path<(i64, i64)>,
) -> Reply {
    let mut db = db.lock().unwrap();
    db.record(format!("DELETE /posts/{id}/comments/{comment_id}"), &headers);
    let comments = db.comments.entry(id).or_default();
    let before = comments.len();
    comments.retain(|c| c["id"] != comment_id);
    if comments.len() == before {
        return Err(error(StatusCode::NOT_FOUND, "Comment not found"));
    }
    Ok(Json(json!({ "message": "deleted" })))
}

async fn list_todos(State(db): State<Shared>, headers: HeaderMap) -> Reply {
    let mut db = db.lock().unwrap();
    db.record("GET /todos".into(), &headers);
    if db.fail_todos {
        // no message in the body
        return Err((StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))));
    }
    Ok(Json(Value::Array(db.todos.clone())))
}

async fn create_todo(State(db): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    let delay = {
        let mut db = db.lock().unwrap();
        db.record("POST /todos".into(), &headers);
        if db.todos.iter().any(|t| t["todo"] == body["todo"]) {
            return Err(error(StatusCode::CONFLICT, "Todo already exists"));
        }
        db.todo_delay
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let mut db = db.lock().unwrap();
    let id = db.next_id();
    let todo = json!({
        "_id": format!("todo-{id}"),
        "todo": body["todo"],
        "status": body["status"],
        "created_at": timestamp(id),
        "updated_at": timestamp(id),
    });
    db.todos.insert(0, todo.clone());
    Ok(Json(todo))
}

async fn update_todo(
    State(db): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    let mut db = db.lock().unwrap();
    db.record(format!("PATCH /todos/{id}"), &headers);
    let todo = db
        .todos
        .iter_mut()
        .find(|t| t["_id"] == id.as_str())
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Todo not found"))?;
    for key in ["todo", "status"] {
        if let Some(value) = body.get(key) {
            todo[key] = value.clone();
        }
    }
    Ok(Json(todo.clone()))
}

async fn delete_todo(State(db): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Reply {
    let mut db = db.lock().unwrap();
    db.record(format!("DELETE /todos/{id}"), &headers);
    let before = db.todos.len();
    db.todos.retain(|t| t["_id"] != id.as_str());
    if db.todos.len() == before {
        return Err(error(StatusCode::NOT_FOUND, "Todo not found"));
    }
    Ok(Json(json!({ "message": "deleted" })))
}

pub fn app(state: Shared) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/signup", post(signup))
        .route("/user", get(get_user).put(put_user))
        .route("/posts", get(list_posts))
        .route("/posts/create", post(create_post))
        .route("/posts/{id}", get(get_post).put(update_post).delete(delete_post))
        .route("/posts/{id}/publish", patch(publish))
        .route("/posts/{id}/unpublish", patch(unpublish))
        .route("/posts/{id}/comments", get(list_comments).post(create_comment))
        .route(
            "/posts/{id}/comments/{comment_id}",
            put(update_comment).delete(delete_comment),
        )
        .route("/todos", get(list_todos).post(create_todo))
        .route("/todos/{id}", patch(update_todo).delete(delete_todo))
        .with_state(state)
}

pub struct MockServer {
    pub base_url: String,
    pub state: Shared,
}

impl MockServer {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState {
            user: json!({
                "id": 1,
                "first_name": "Ada",
                "last_name": "Lovelace",
                "email": EMAIL,
                "img_url": "https://cdn.example.com/ada.png",
                "is_active": true,
            }),
            next_id: 100,
            ..MockState::default()
        }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = app(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn seed_posts(&self, count: i64) {
        let mut db = self.state.lock().unwrap();
        // newest first, as the API lists them
        db.posts = (1..=count)
            .rev()
            .map(|id| post_json(id, &format!("Post number {id}"), false))
            .collect();
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn client(&self) -> (BlogClient, GuardOutcome, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        let (client, outcome) =
            BlogClient::new(ClientConfig::new(self.base_url.clone()), store.clone()).unwrap();
        (client, outcome, store)
    }

    pub async fn signed_in_client(&self) -> BlogClient {
        let (client, _, _) = self.client();
        client
            .auth()
            .login(blog_client::models::LoginRequest {
                email: EMAIL.into(),
                password: PASSWORD.into(),
            })
            .await
            .unwrap();
        client
    }
}
