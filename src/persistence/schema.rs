//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS`, so the bootstrap
//! runs on every startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS course (
    id                  TEXT PRIMARY KEY NOT NULL,
    name                TEXT,
    course_code         TEXT,
    image_download_url  TEXT,
    color               TEXT
);

CREATE TABLE IF NOT EXISTS grading_period (
    id              TEXT PRIMARY KEY NOT NULL,
    course_id       TEXT NOT NULL,
    title           TEXT NOT NULL,
    start_date      TEXT,
    end_date        TEXT
);

CREATE TABLE IF NOT EXISTS submission_comment (
    id                  TEXT PRIMARY KEY NOT NULL,
    submission_id       TEXT NOT NULL,
    author_id           TEXT NOT NULL,
    author_name         TEXT NOT NULL,
    author_avatar_url   TEXT,
    comment             TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    attachment_ids      TEXT NOT NULL DEFAULT '[]',
    is_placeholder      INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_grading_period_course ON grading_period(course_id);
CREATE INDEX IF NOT EXISTS idx_comment_submission ON submission_comment(submission_id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
