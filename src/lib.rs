#![forbid(unsafe_code)]

//! Local-first sync and caching engine for an LMS client.
//!
//! Cached records are published immediately, refreshed from the REST API
//! through dependency-ordered group operations, and merged back into a
//! `SQLite` store whose change notifications drive republishing. Comments
//! with attachments are posted optimistically through a placeholder record.

pub mod config;
pub mod errors;
pub mod models;
pub mod persistence;
pub mod remote;
pub mod scheduler;
pub mod sync;
pub mod upload;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
