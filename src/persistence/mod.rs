//! Persistence layer modules.

pub mod comment_repo;
pub mod course_repo;
pub mod db;
pub mod grading_period_repo;
pub mod schema;
pub mod store;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
