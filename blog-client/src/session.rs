//! Client-side session: the persisted `auth` record, the startup guard and
//! the injected context that owns the live session.
//!
//! Only three places write the record: [`SessionContext::sign_in`],
//! [`SessionContext::update_user`] and [`SessionContext::sign_out`] (the
//! guard clears it through the same store). Writes always replace the whole
//! record.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BlogClientError;
use crate::models::UserProfile;

/// Storage key of the persisted record.
pub const SESSION_KEY: &str = "auth";

/// Sessions last 24 hours from login or signup.
pub const SESSION_TTL_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: UserProfile,
    pub token: String,
    /// Absolute expiry, milliseconds since the Unix epoch.
    pub expiry: i64,
}

impl Session {
    pub fn new(user: UserProfile, token: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user,
            token: token.into(),
            expiry: now.timestamp_millis() + SESSION_TTL_MS,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() <= self.expiry
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.expiry)
    }
}

// ==================== Хранилище ====================

/// Durable storage for the single serialized session record.
pub trait SessionStore: Send + Sync + fmt::Debug {
    fn load(&self) -> Result<Option<String>, BlogClientError>;
    fn save(&self, record: &str) -> Result<(), BlogClientError>;
    fn clear(&self) -> Result<(), BlogClientError>;
}

/// Keeps the record in `<dir>/auth.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{SESSION_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<String>, BlogClientError> {
        match fs::read_to_string(&self.path) {
            Ok(record) if record.trim().is_empty() => Ok(None),
            Ok(record) => Ok(Some(record)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, record: &str) -> Result<(), BlogClientError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(record.as_bytes())?;
            file.sync_all()?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&tmp)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&tmp, perms)?;
        }

        fs::rename(&tmp, &self.path)?;
        tracing::debug!("Session record written to {:?}", self.path);
        Ok(())
    }

    fn clear(&self) -> Result<(), BlogClientError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!("Session record removed from {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    record: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: impl Into<String>) -> Self {
        Self {
            record: Mutex::new(Some(record.into())),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<String>, BlogClientError> {
        Ok(self
            .record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, record: &str) -> Result<(), BlogClientError> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(record.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), BlogClientError> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

fn write_record(store: &dyn SessionStore, session: &Session) -> Result<(), BlogClientError> {
    let record = serde_json::to_string(session)?;
    store.save(&record)
}

// ==================== Проверка при старте ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    Absent,
    Expired,
    Corrupted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GuardOutcome {
    SignedIn(Session),
    SignedOut(SignOutReason),
}

impl GuardOutcome {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, GuardOutcome::SignedIn(_))
    }
}

pub struct SessionGuard;

impl SessionGuard {
    /// Validates the persisted record against `now`.
    ///
    /// Synchronous and network-free, so it can finish before any rendering
    /// decision. Expired and corrupted records are cleared from the store.
    pub fn restore(store: &dyn SessionStore, now: DateTime<Utc>) -> GuardOutcome {
        let record = match store.load() {
            Ok(Some(record)) => record,
            Ok(None) => return GuardOutcome::SignedOut(SignOutReason::Absent),
            Err(e) => {
                tracing::warn!("Failed to read session record: {}", e);
                Self::discard(store);
                return GuardOutcome::SignedOut(SignOutReason::Corrupted);
            }
        };

        let session = match serde_json::from_str::<Session>(&record) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Discarding corrupted session record: {}", e);
                Self::discard(store);
                return GuardOutcome::SignedOut(SignOutReason::Corrupted);
            }
        };

        if !session.is_valid_at(now) {
            tracing::info!("Session expired at {:?}, signing out", session.expires_at());
            Self::discard(store);
            return GuardOutcome::SignedOut(SignOutReason::Expired);
        }

        tracing::debug!("Session restored for user {}", session.user.id);
        GuardOutcome::SignedIn(session)
    }

    fn discard(store: &dyn SessionStore) {
        if let Err(e) = store.clear() {
            tracing::warn!("Failed to clear session record: {}", e);
        }
    }
}

// ==================== Контекст ====================

/// Owner of the live session, shared by everything that needs the token.
#[derive(Debug, Clone)]
pub struct SessionContext {
    current: Arc<RwLock<Option<Session>>>,
    store: Arc<dyn SessionStore>,
}

impl SessionContext {
    /// Starts signed out without looking at the store.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
            store,
        }
    }

    /// Runs the guard and adopts its outcome.
    pub fn restore(store: Arc<dyn SessionStore>, now: DateTime<Utc>) -> (Self, GuardOutcome) {
        let outcome = SessionGuard::restore(store.as_ref(), now);
        let context = Self::new(store);
        if let GuardOutcome::SignedIn(session) = &outcome {
            context.replace(Some(session.clone()));
        }
        (context, outcome)
    }

    pub fn current(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn token(&self) -> Option<String> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.token.clone())
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.user.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn replace(&self, session: Option<Session>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    /// Creates and persists a fresh session after login or signup.
    pub fn sign_in(
        &self,
        user: UserProfile,
        token: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Session, BlogClientError> {
        let session = Session::new(user, token, now);
        write_record(self.store.as_ref(), &session)?;
        self.replace(Some(session.clone()));
        tracing::info!("Signed in as user {}", session.user.id);
        Ok(session)
    }

    /// Replaces the user fields, keeping token and expiry.
    ///
    /// When the server hands back the same image URL after an upload, a
    /// `t=<now>` suffix is added so cached copies are not reused.
    pub fn update_user(&self, mut user: UserProfile, now: DateTime<Utc>) -> Result<(), BlogClientError> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let Some(session) = guard.as_mut() else {
            return Err(BlogClientError::Unauthorized("not signed in".into()));
        };

        let busted = match (&session.user.img_url, &user.img_url) {
            (Some(prev), Some(next)) if strip_cache_buster(prev) == strip_cache_buster(next) => {
                Some(bust_image_cache(&strip_cache_buster(next), now))
            }
            _ => None,
        };
        if busted.is_some() {
            user.img_url = busted;
        }

        let mut updated = session.clone();
        updated.user = user;
        write_record(self.store.as_ref(), &updated)?;
        *session = updated;
        Ok(())
    }

    pub fn sign_out(&self) -> Result<(), BlogClientError> {
        self.replace(None);
        self.store.clear()?;
        tracing::info!("Signed out");
        Ok(())
    }
}

/// Appends a `t=<millis>` query parameter to an image URL.
pub fn bust_image_cache(url: &str, now: DateTime<Utc>) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}t={}", now.timestamp_millis())
}

/// Removes a trailing `t=<digits>` parameter added by [`bust_image_cache`].
pub fn strip_cache_buster(url: &str) -> String {
    for sep in ["&t=", "?t="] {
        if let Some(pos) = url.rfind(sep) {
            let tail = &url[pos + sep.len()..];
            if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
                return url[..pos].to_string();
            }
        }
    }
    url.to_string()
}
