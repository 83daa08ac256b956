//! Runtime settings for the local store and the remote deck service.
//!
//! Values come from the environment (`DECKSYNC_*`), optionally seeded from a
//! `.env` file by the front end, and can be overridden field by field.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

pub const API_URL_ENV: &str = "DECKSYNC_API_URL";
pub const REQUEST_TIMEOUT_ENV: &str = "DECKSYNC_REQUEST_TIMEOUT_MS";
pub const DB_PATH_ENV: &str = "DECKSYNC_DB_PATH";

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Settings shared by the store, the HTTP gateway and the sync engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SyncSettings {
    /// Base URL of the deck service, without trailing slash
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Deadline for each remote call
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Local database file; falls back to [`default_db_path`]
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

const fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base_url: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            db_path: None,
        }
    }
}

impl SyncSettings {
    /// Read settings from `DECKSYNC_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(url) = normalize_text_option(lookup(API_URL_ENV)) {
            settings.api_base_url = Some(normalize_api_url(&url)?);
        }

        if let Some(raw) = normalize_text_option(lookup(REQUEST_TIMEOUT_ENV)) {
            settings.request_timeout_ms = parse_timeout(&raw)?;
        }

        settings.db_path = normalize_text_option(lookup(DB_PATH_ENV)).map(PathBuf::from);
        Ok(settings)
    }

    /// Override the API URL; blank clears it
    pub fn with_api_url(mut self, url: Option<String>) -> Result<Self> {
        if let Some(url) = url {
            self.api_base_url = match normalize_text_option(Some(url)) {
                Some(url) => Some(normalize_api_url(&url)?),
                None => None,
            };
        }
        Ok(self)
    }

    #[must_use]
    pub fn with_db_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.db_path = path;
        }
        self
    }

    /// Whether a remote endpoint is available for sync
    pub const fn is_remote_configured(&self) -> bool {
        self.api_base_url.is_some()
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Configured database path or the platform default
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => default_db_path(),
        }
    }
}

/// `<data dir>/decksync/decksync.db`
pub fn default_db_path() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("decksync").join("decksync.db"))
        .ok_or_else(|| Error::Config("could not determine a data directory".to_string()))
}

fn normalize_api_url(raw: &str) -> Result<String> {
    let value = raw.trim();
    if is_http_url(value) {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(Error::Config(format!(
            "{API_URL_ENV} must include http:// or https:// (got '{value}')"
        )))
    }
}

fn parse_timeout(raw: &str) -> Result<u64> {
    match raw.parse::<u64>() {
        Ok(0) | Err(_) => Err(Error::Config(format!(
            "{REQUEST_TIMEOUT_ENV} must be a positive number of milliseconds (got '{raw}')"
        ))),
        Ok(value) => Ok(value),
    }
}
