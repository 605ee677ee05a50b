//! Error types shared across the sync engine.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all sync failure modes.
///
/// Every variant carries a rendered message rather than a source error so the
/// value stays `Clone`: member failures of a group operation are both
/// collected into a report and forwarded to an error sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Local persistence failure when reading or writing `SQLite`.
    Db(String),
    /// Remote API request failure; the message names the endpoint.
    Network(String),
    /// File upload batch failure.
    Upload(String),
    /// No authenticated session is available.
    Unauthenticated(String),
    /// An operation graph or request was wired incorrectly.
    InvalidOperation(String),
    /// Work was cancelled before it reached a terminal state.
    Cancelled(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Network(msg) => write!(f, "network: {msg}"),
            Self::Upload(msg) => write!(f, "upload: {msg}"),
            Self::Unauthenticated(msg) => write!(f, "unauthenticated: {msg}"),
            Self::InvalidOperation(msg) => write!(f, "invalid operation: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Db(format!("invalid json column: {err}"))
    }
}
