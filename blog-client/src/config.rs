use std::time::Duration;

use crate::error::BlogClientError;

pub const BASE_URL_VAR: &str = "BLOG_API_BASE_URL";
pub const TIMEOUT_VAR: &str = "BLOG_HTTP_TIMEOUT_SECS";
pub const CONNECT_TIMEOUT_VAR: &str = "BLOG_CONNECT_TIMEOUT_SECS";
pub const PAGE_SIZE_VAR: &str = "BLOG_PAGE_SIZE";

/// Delay applied to search input before a reset fetch is issued.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub page_size: u32,
    pub search_debounce: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            page_size: 10,
            search_debounce: SEARCH_DEBOUNCE,
        }
    }

    /// Reads the configuration from the process environment, loading a
    /// `.env` file first when one exists.
    pub fn from_env() -> Result<Self, BlogClientError> {
        dotenvy::dotenv().ok();

        let base_url = std::env::var(BASE_URL_VAR)
            .map_err(|_| BlogClientError::InvalidConfig(format!("{BASE_URL_VAR} must be set")))?;
        let mut config = Self::new(base_url);

        if let Some(secs) = read_number::<u64>(TIMEOUT_VAR)? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = read_number::<u64>(CONNECT_TIMEOUT_VAR)? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = read_number::<u32>(PAGE_SIZE_VAR)? {
            config.page_size = size;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn validate(&self) -> Result<(), BlogClientError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(BlogClientError::InvalidConfig(format!(
                "base URL must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        if self.page_size == 0 {
            return Err(BlogClientError::InvalidConfig(
                "page size must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn read_number<T: std::str::FromStr>(var: &str) -> Result<Option<T>, BlogClientError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| BlogClientError::InvalidConfig(format!("{var} is not a number: {raw:?}"))),
        Err(_) => Ok(None),
    }
}
