//! Submission comment repository for `SQLite` persistence.

use chrono::{DateTime, Utc};

use crate::models::comment::SubmissionComment;
use crate::sync::placeholder::placeholder_suffix;
use crate::{AppError, Result};

use super::store::{Entity, LocalStore};

/// Repository wrapper around the local store for submission comments.
#[derive(Clone)]
pub struct CommentRepo {
    store: LocalStore,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct CommentRow {
    id: String,
    submission_id: String,
    author_id: String,
    author_name: String,
    author_avatar_url: Option<String>,
    comment: String,
    created_at: String,
    attachment_ids: String,
    is_placeholder: i64,
}

impl CommentRow {
    fn into_comment(self) -> Result<SubmissionComment> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);
        let attachment_ids: Vec<String> = serde_json::from_str(&self.attachment_ids)?;

        Ok(SubmissionComment {
            id: self.id,
            submission_id: self.submission_id,
            author_id: self.author_id,
            author_name: self.author_name,
            author_avatar_url: self.author_avatar_url,
            comment: self.comment,
            created_at,
            attachment_ids,
            is_placeholder: self.is_placeholder != 0,
        })
    }
}

const INSERT: &str = "INSERT INTO submission_comment (id, submission_id, author_id, author_name,
     author_avatar_url, comment, created_at, attachment_ids, is_placeholder)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

const UPSERT: &str = "INSERT INTO submission_comment (id, submission_id, author_id, author_name,
     author_avatar_url, comment, created_at, attachment_ids, is_placeholder)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
     ON CONFLICT(id) DO UPDATE SET
        submission_id = excluded.submission_id,
        author_id = excluded.author_id,
        author_name = excluded.author_name,
        author_avatar_url = excluded.author_avatar_url,
        comment = excluded.comment,
        created_at = excluded.created_at,
        attachment_ids = excluded.attachment_ids,
        is_placeholder = excluded.is_placeholder";

impl CommentRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Insert a new comment. An existing row with the same id is never
    /// overwritten.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the id is already stored or the write fails.
    pub async fn insert(&self, comment: &SubmissionComment) -> Result<SubmissionComment> {
        let attachment_ids = serde_json::to_string(&comment.attachment_ids)?;
        sqlx::query(INSERT)
            .bind(&comment.id)
            .bind(&comment.submission_id)
            .bind(&comment.author_id)
            .bind(&comment.author_name)
            .bind(&comment.author_avatar_url)
            .bind(&comment.comment)
            .bind(comment.created_at.to_rfc3339())
            .bind(&attachment_ids)
            .bind(i64::from(comment.is_placeholder))
            .execute(self.store.db())
            .await?;

        self.store
            .notify(Entity::SubmissionComment, vec![comment.id.clone()]);
        Ok(comment.clone())
    }

    /// Swap a placeholder for its authoritative comment.
    ///
    /// The delete and the insert share one transaction, so readers see
    /// either the placeholder or the confirmed comment, never both. Only a
    /// row flagged as a placeholder is deleted. With `placeholder_id = None`
    /// this is a plain upsert.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if a statement or the commit fails; the
    /// placeholder is left untouched in that case.
    pub async fn replace(
        &self,
        placeholder_id: Option<&str>,
        comment: &SubmissionComment,
    ) -> Result<SubmissionComment> {
        let attachment_ids = serde_json::to_string(&comment.attachment_ids)?;
        let mut tx = self.store.db().begin().await?;

        let mut changed = Vec::with_capacity(2);
        if let Some(placeholder_id) = placeholder_id.filter(|id| *id != comment.id) {
            sqlx::query("DELETE FROM submission_comment WHERE id = ?1 AND is_placeholder = 1")
                .bind(placeholder_id)
                .execute(&mut *tx)
                .await?;
            changed.push(placeholder_id.to_owned());
        }

        sqlx::query(UPSERT)
            .bind(&comment.id)
            .bind(&comment.submission_id)
            .bind(&comment.author_id)
            .bind(&comment.author_name)
            .bind(&comment.author_avatar_url)
            .bind(&comment.comment)
            .bind(comment.created_at.to_rfc3339())
            .bind(&attachment_ids)
            .bind(i64::from(comment.is_placeholder))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        changed.push(comment.id.clone());
        self.store.notify(Entity::SubmissionComment, changed);
        Ok(comment.clone())
    }

    /// Retrieve a comment by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or the row is corrupt.
    pub async fn get(&self, id: &str) -> Result<Option<SubmissionComment>> {
        let row: Option<CommentRow> =
            sqlx::query_as("SELECT * FROM submission_comment WHERE id = ?1")
                .bind(id)
                .fetch_optional(self.store.db())
                .await?;
        row.map(CommentRow::into_comment).transpose()
    }

    /// Comments on one submission, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or a row is corrupt.
    pub async fn list_for_submission(&self, submission_id: &str) -> Result<Vec<SubmissionComment>> {
        let rows: Vec<CommentRow> = sqlx::query_as(
            "SELECT * FROM submission_comment WHERE submission_id = ?1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(submission_id)
        .fetch_all(self.store.db())
        .await?;
        rows.into_iter().map(CommentRow::into_comment).collect()
    }

    /// Total number of cached comments.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM submission_comment")
            .fetch_one(self.store.db())
            .await?;
        Ok(row.0)
    }

    /// Highest placeholder suffix still stored, or 0 when none is.
    ///
    /// Orphaned placeholders outlive the process, so a fresh id generator
    /// must start above this value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn max_placeholder_suffix(&self) -> Result<u64> {
        let ids: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM submission_comment WHERE is_placeholder = 1")
                .fetch_all(self.store.db())
                .await?;
        Ok(ids
            .iter()
            .filter_map(|(id,)| placeholder_suffix(id))
            .max()
            .unwrap_or(0))
    }
}
