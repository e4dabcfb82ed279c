mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use blog_client::config::BASE_URL_VAR;
use blog_client::models::{
    ImageUpload, LoginRequest, PostFilter, PostForm, ProfileForm, ResourceId, SignupRequest,
    TodoInput, TodoPatch, TodoStatus,
};
use blog_client::session::{FileSessionStore, SignOutReason};
use blog_client::{BlogClient, BlogClientError, ClientConfig, GuardOutcome, MutationOutcome, SortOrder};
use clap::{Parser, Subcommand};
use colored::Colorize;

const DEFAULT_SERVER: &str = "http://localhost:3000";
const SESSION_DIR_VAR: &str = "BLOG_SESSION_DIR";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// API base URL (defaults to $BLOG_API_BASE_URL or http://localhost:3000)
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// Directory holding the session record (defaults to $BLOG_SESSION_DIR or ~/.blog_client)
    #[arg(long, global = true)]
    session_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Signup {
        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,

        /// Defaults to the password
        #[arg(long)]
        confirm_password: Option<String>,
    },

    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    Logout,

    Status,

    Whoami {
        /// Re-read the profile from the server first
        #[arg(long)]
        refresh: bool,
    },

    Profile {
        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        /// JPG or PNG, at most 5 MB
        #[arg(long)]
        image: Option<PathBuf>,
    },

    #[command(subcommand)]
    Posts(PostCommands),

    #[command(subcommand)]
    Comments(CommentCommands),

    #[command(subcommand)]
    Todos(TodoCommands),
}

#[derive(Subcommand)]
enum PostCommands {
    List {
        /// Load pages up to and including this one
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long)]
        size: Option<u32>,

        #[arg(long)]
        search: Option<String>,

        #[arg(long)]
        published: Option<bool>,

        /// Keep loading until every page is fetched
        #[arg(long)]
        all: bool,
    },

    Get {
        #[arg(short, long)]
        id: ResourceId,
    },

    Create {
        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        content: String,

        #[arg(long)]
        image: Option<PathBuf>,
    },

    Update {
        #[arg(short, long)]
        id: ResourceId,

        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        content: String,

        #[arg(long)]
        image: Option<PathBuf>,
    },

    Delete {
        #[arg(short, long)]
        id: ResourceId,
    },

    Publish {
        #[arg(short, long)]
        id: ResourceId,
    },

    Unpublish {
        #[arg(short, long)]
        id: ResourceId,
    },
}

#[derive(Subcommand)]
enum CommentCommands {
    Add {
        #[arg(long)]
        post: ResourceId,

        #[arg(short, long)]
        content: String,
    },

    Edit {
        #[arg(long)]
        post: ResourceId,

        #[arg(short, long)]
        id: ResourceId,

        #[arg(short, long)]
        content: String,
    },

    Delete {
        #[arg(long)]
        post: ResourceId,

        #[arg(short, long)]
        id: ResourceId,
    },
}

#[derive(Subcommand)]
enum TodoCommands {
    List,

    Add {
        todo: String,

        #[arg(long, default_value = "Not Started")]
        status: TodoStatus,
    },

    Update {
        #[arg(short, long)]
        id: ResourceId,

        #[arg(short, long)]
        todo: Option<String>,

        #[arg(long)]
        status: Option<TodoStatus>,
    },

    Toggle {
        #[arg(short, long)]
        id: ResourceId,
    },

    Delete {
        #[arg(short, long)]
        id: ResourceId,
    },
}

#[tokio::main]
async fn main() {
    logging::init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        report(&e);
        std::process::exit(1);
    }
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<BlogClientError>() {
        Some(BlogClientError::Validation(errors)) => {
            println!("{}", "❌ Please fix the following:".red());
            for error in errors.errors() {
                println!("   {}: {}", error.field.yellow(), error.message);
            }
        }
        Some(client_err) => {
            println!("{}", format!("❌ {}", client_err.user_message(&client_err.to_string())).red())
        }
        None => {
            // rejected forms arrive as "field: message; field: message"
            let text = format!("{:#}", err);
            let mut lines = text.split("; ");
            if let Some(first) = lines.next() {
                println!("{}", format!("❌ {}", first).red());
            }
            for line in lines {
                println!("   {}", line.red());
            }
        }
    }
}

fn load_config(server: Option<String>) -> Result<ClientConfig> {
    dotenvy::dotenv().ok();

    let mut config = if std::env::var(BASE_URL_VAR).is_ok() {
        ClientConfig::from_env().context("Invalid client configuration")?
    } else {
        ClientConfig::new(DEFAULT_SERVER)
    };
    if let Some(server) = server {
        config.base_url = server.trim_end_matches('/').to_string();
    }
    Ok(config)
}

fn session_dir(custom: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = custom {
        return Ok(dir);
    }
    if let Ok(dir) = std::env::var(SESSION_DIR_VAR) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".blog_client"))
}

fn read_image(path: &Path) -> Result<ImageUpload> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read image {:?}", path))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let mime = match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    };
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_string();
    Ok(ImageUpload {
        file_name,
        mime: mime.to_string(),
        bytes,
    })
}

/// Turns a non-successful outcome into an error for `report`.
fn settle<T>(outcome: MutationOutcome<T>) -> Result<T> {
    match outcome {
        MutationOutcome::Succeeded(value) => Ok(value),
        other => anyhow::bail!(other.message().unwrap_or("Action failed").to_string()),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}

fn require_session(client: &BlogClient) -> Result<()> {
    if !client.session().is_signed_in() {
        anyhow::bail!("Not signed in. Please login first: blog-cli login --email <email> --password <password>");
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.server)?;
    if let Commands::Posts(PostCommands::List { size: Some(size), .. }) = &cli.command {
        config = config.with_page_size(*size);
    }
    let store = Arc::new(FileSessionStore::new(session_dir(cli.session_dir)?));
    let (client, outcome) =
        BlogClient::new(config, store.clone()).context("Failed to create blog client")?;
    tracing::debug!("Using {} with session file {:?}", client.config().base_url, store.path());

    match cli.command {
        Commands::Signup {
            first_name,
            last_name,
            email,
            password,
            confirm_password,
        } => {
            println!("📝 Signing up: {}", email);
            let confirm = confirm_password.unwrap_or_else(|| password.clone());
            let session = client
                .auth()
                .signup(
                    SignupRequest {
                        first_name,
                        last_name,
                        email,
                        password,
                    },
                    &confirm,
                )
                .await?;
            println!("{}", "✅ Signup successful!".green());
            println!("   User ID: {}", session.user.id);
            println!("   Name: {}", session.user.display_name());
            println!("   Session saved to {:?}", store.path());
        }

        Commands::Login { email, password } => {
            println!("🔑 Logging in as: {}", email);
            let session = client.auth().login(LoginRequest { email, password }).await?;
            println!("{}", "✅ Login successful!".green());
            println!("   User ID: {}", session.user.id);
            println!("   Name: {}", session.user.display_name());
            if let Some(expires) = session.expires_at() {
                println!("   Expires: {}", expires.to_rfc3339());
            }
        }

        Commands::Logout => {
            client.auth().logout()?;
            println!("{}", "✅ Logged out".green());
        }

        Commands::Status => match outcome {
            GuardOutcome::SignedIn(session) => {
                println!("{}", "🔑 Signed in".green());
                println!("   User: {} <{}>", session.user.display_name(), session.user.email);
                if let Some(expires) = session.expires_at() {
                    println!("   Expires: {}", expires.to_rfc3339());
                }
                println!("   Session file: {:?}", store.path());
            }
            GuardOutcome::SignedOut(reason) => {
                let why = match reason {
                    SignOutReason::Absent => "no saved session",
                    SignOutReason::Expired => "session expired",
                    SignOutReason::Corrupted => "saved session was unreadable",
                };
                println!("{}", format!("🔒 Signed out ({})", why).yellow());
            }
        },

        Commands::Whoami { refresh } => {
            require_session(&client)?;
            let user = if refresh {
                client.auth().refresh_user().await?
            } else {
                client
                    .session()
                    .user()
                    .context("Session has no user")?
            };
            println!("👤 {} <{}>", user.display_name(), user.email);
            println!("   ID: {}", user.id);
            if let Some(img) = &user.img_url {
                println!("   Image: {}", img);
            }
        }

        Commands::Profile {
            first_name,
            last_name,
            image,
        } => {
            require_session(&client)?;
            let image = image.as_deref().map(read_image).transpose()?;
            let user = client
                .auth()
                .update_profile(ProfileForm {
                    first_name,
                    last_name,
                    image,
                })
                .await?;
            println!("{}", "✅ Profile updated!".green());
            println!("   Name: {}", user.display_name());
            if let Some(img) = &user.img_url {
                println!("   Image: {}", img);
            }
        }

        Commands::Posts(command) => run_posts(&client, command).await?,
        Commands::Comments(command) => run_comments(&client, command).await?,
        Commands::Todos(command) => run_todos(&client, command).await?,
    }

    Ok(())
}

async fn run_posts(client: &BlogClient, command: PostCommands) -> Result<()> {
    require_session(client)?;

    match command {
        PostCommands::List {
            page,
            search,
            published,
            all,
            ..
        } => {
            let posts = client.posts(PostFilter {
                search,
                is_published: published,
            });

            posts.reset().await?;
            if all {
                posts.load_all().await?;
            } else {
                while posts.cursor().page < page && posts.load_more().await?.is_some() {}
            }

            let items = posts.items();
            let cursor = posts.cursor();
            println!("📋 {} posts (through page {})", items.len(), cursor.page);
            println!();
            if items.is_empty() {
                println!("   No posts found");
            }
            for (i, post) in items.iter().enumerate() {
                let badge = if post.is_published {
                    "published".green()
                } else {
                    "draft".yellow()
                };
                println!("   {}. [{}] {} ({})", i + 1, post.id, post.title, badge);
                if let Some(created) = &post.created_at {
                    println!("      Created: {}", created);
                }
                println!("      Content: {}", truncate(&post.content, 50));
                println!();
            }
            if cursor.has_more {
                println!("   More posts available: --page {}", cursor.page + 1);
            }
        }

        PostCommands::Get { id } => {
            let actions = client.post_actions(None);
            let post = actions.open(&id).await?;
            println!("📄 [{}] {}", post.id, post.title.bold());
            println!("   Status: {}", if post.is_published { "published" } else { "draft" });
            if let Some(created) = &post.created_at {
                println!("   Created: {}", created);
            }
            if let Some(img) = &post.img_url {
                println!("   Image: {}", img);
            }
            println!();
            println!("{}", post.content);
            println!();

            let thread = client.comments(post.id.clone(), SortOrder::NewestFirst);
            thread.reset_or_fallback(post.comments.clone()).await?;
            thread.load_all().await?;
            let comments = thread.items();
            println!("💬 {} comments", comments.len());
            for comment in comments {
                println!("   [{}] {}", comment.id, comment.content);
            }
        }

        PostCommands::Create {
            title,
            content,
            image,
        } => {
            let image = image.as_deref().map(read_image).transpose()?;
            let actions = client.post_actions(None);
            let created = settle(actions.create(PostForm { title, content, image }).await)?;
            println!("{}", "✅ Post created successfully!".green());
            if let Some(post) = created {
                println!("   ID: {}", post.id);
                println!("   Title: {}", post.title);
            }
        }

        PostCommands::Update {
            id,
            title,
            content,
            image,
        } => {
            let image = image.as_deref().map(read_image).transpose()?;
            let actions = client.post_actions(None);
            let post = settle(actions.update(&id, PostForm { title, content, image }).await)?;
            println!("{}", "✅ Post updated successfully!".green());
            println!("   ID: {}", post.id);
            println!("   Title: {}", post.title);
        }

        PostCommands::Delete { id } => {
            let actions = client.post_actions(None);
            // load first so a published post is refused locally
            actions.open(&id).await?;
            settle(actions.delete(&id).await)?;
            println!("{}", "✅ Post deleted successfully!".green());
        }

        PostCommands::Publish { id } => {
            let actions = client.post_actions(None);
            actions.open(&id).await?;
            settle(actions.set_published(&id, true).await)?;
            println!("{}", format!("✅ Post {} published", id).green());
        }

        PostCommands::Unpublish { id } => {
            let actions = client.post_actions(None);
            actions.open(&id).await?;
            settle(actions.set_published(&id, false).await)?;
            println!("{}", format!("✅ Post {} unpublished", id).green());
        }
    }

    Ok(())
}

async fn run_comments(client: &BlogClient, command: CommentCommands) -> Result<()> {
    require_session(client)?;

    match command {
        CommentCommands::Add { post, content } => {
            let thread = client.comments(post, SortOrder::OldestFirst);
            let actions = client.comment_actions(thread.clone());
            settle(actions.create(&content).await)?;
            println!("{}", "✅ Comment added".green());
            println!("   Thread now has {} comments on the first page", thread.items().len());
        }

        CommentCommands::Edit { post, id, content } => {
            let actions = client.comment_actions(client.comments(post, SortOrder::OldestFirst));
            settle(actions.update(&id, &content).await)?;
            println!("{}", "✅ Comment updated".green());
        }

        CommentCommands::Delete { post, id } => {
            let actions = client.comment_actions(client.comments(post, SortOrder::OldestFirst));
            settle(actions.delete(&id).await)?;
            println!("{}", "✅ Comment deleted".green());
        }
    }

    Ok(())
}

async fn run_todos(client: &BlogClient, command: TodoCommands) -> Result<()> {
    require_session(client)?;
    let todos = client.todos();

    match command {
        TodoCommands::List => {
            todos.reset().await?;
            let items = todos.items();
            println!("📋 {} todos", items.len());
            for todo in items {
                let status = match todo.status {
                    TodoStatus::Completed => todo.status.as_str().green(),
                    TodoStatus::InProgress => todo.status.as_str().yellow(),
                    TodoStatus::NotStarted => todo.status.as_str().normal(),
                };
                println!("   [{}] {} ({})", todo.id, todo.todo, status);
            }
        }

        TodoCommands::Add { todo, status } => {
            let actions = client.todo_actions(todos);
            let created = settle(actions.create(TodoInput { todo, status }).await)?;
            println!("{}", "✅ Todo added".green());
            println!("   ID: {}", created.id);
        }

        TodoCommands::Update { id, todo, status } => {
            let actions = client.todo_actions(todos);
            let updated = settle(actions.update(&id, TodoPatch { todo, status }).await)?;
            println!("{}", "✅ Todo updated".green());
            println!("   {} ({})", updated.todo, updated.status.as_str());
        }

        TodoCommands::Toggle { id } => {
            todos.reset().await?;
            let actions = client.todo_actions(todos);
            let updated = settle(actions.toggle(&id).await)?;
            println!("{}", format!("✅ {} is now {}", updated.todo, updated.status.as_str()).green());
        }

        TodoCommands::Delete { id } => {
            let actions = client.todo_actions(todos);
            settle(actions.delete(&id).await)?;
            println!("{}", "✅ Todo deleted".green());
        }
    }

    Ok(())
}
