//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::models::session::LoginSession;
use crate::{AppError, Result};

/// OS keychain service name holding the API access token.
pub const KEYCHAIN_SERVICE: &str = "lms-sync";

/// Keychain entry name for the API access token.
pub const TOKEN_KEYCHAIN_KEY: &str = "api_token";

/// Environment variable consulted when the keychain has no token.
pub const TOKEN_ENV_VAR: &str = "LMS_API_TOKEN";

/// Identity of the signed-in user, copied onto placeholder records.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct UserConfig {
    /// LMS user identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Avatar image URL.
    #[serde(default)]
    pub avatar_url: Option<String>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".lms-sync").join("cache.db")
}

fn default_per_page() -> u32 {
    100
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_change_buffer() -> usize {
    256
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Base URL of the LMS instance, e.g. `https://canvas.example.edu`.
    pub base_url: String,
    /// `SQLite` cache location.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Page size requested from list endpoints.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// HTTP request timeout.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Capacity of the local store change channel.
    #[serde(default = "default_change_buffer")]
    pub change_buffer: usize,
    /// Signed-in user, if any.
    #[serde(default)]
    pub user: Option<UserConfig>,
    /// API access token (populated at runtime).
    #[serde(skip)]
    pub api_token: String,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the API token from the OS keychain with env-var fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither the keychain nor
    /// `LMS_API_TOKEN` provides a token.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.api_token = load_credential(TOKEN_KEYCHAIN_KEY, TOKEN_ENV_VAR).await?;
        Ok(())
    }

    /// HTTP request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// The authenticated session, present only when a user and a token are
    /// both configured.
    #[must_use]
    pub fn session(&self) -> Option<LoginSession> {
        let user = self.user.as_ref()?;
        if self.api_token.is_empty() {
            return None;
        }
        Some(LoginSession {
            base_url: self.base_url.clone(),
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            avatar_url: user.avatar_url.clone(),
            access_token: self.api_token.clone(),
        })
    }

    fn validate(&mut self) -> Result<()> {
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(AppError::Config(
                "base_url must be an http:// or https:// URL".into(),
            ));
        }
        let trimmed = self.base_url.trim_end_matches('/').len();
        self.base_url.truncate(trimmed);

        if self.per_page == 0 || self.per_page > 100 {
            return Err(AppError::Config("per_page must be between 1 and 100".into()));
        }

        if self.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "request_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.change_buffer == 0 {
            return Err(AppError::Config(
                "change_buffer must be greater than zero".into(),
            ));
        }

        if let Some(user) = &self.user {
            if user.id.trim().is_empty() {
                return Err(AppError::Config("user.id must not be empty".into()));
            }
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYCHAIN_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain service {KEYCHAIN_SERVICE} \
             or {env_key} env var"
        ))),
    }
}
