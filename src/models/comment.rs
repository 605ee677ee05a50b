//! Submission comment records, including optimistic placeholders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::LoginSession;

/// Body text shown on a placeholder while its files upload.
pub const PLACEHOLDER_BODY: &str = "See attached files.";

/// A comment on a submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SubmissionComment {
    /// Server identifier, or `placeholder-<n>` before confirmation.
    pub id: String,
    /// Owning submission.
    pub submission_id: String,
    /// Author user identifier.
    pub author_id: String,
    /// Author display name.
    pub author_name: String,
    /// Author avatar image URL.
    pub author_avatar_url: Option<String>,
    /// Comment body.
    pub comment: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Identifiers of attached files.
    pub attachment_ids: Vec<String>,
    /// Whether this record is a local stand-in awaiting the server.
    pub is_placeholder: bool,
}

impl SubmissionComment {
    /// Construct a placeholder authored by the session user.
    #[must_use]
    pub fn placeholder(id: String, submission_id: String, session: &LoginSession) -> Self {
        Self {
            id,
            submission_id,
            author_id: session.user_id.clone(),
            author_name: session.user_name.clone(),
            author_avatar_url: session.avatar_url.clone(),
            comment: PLACEHOLDER_BODY.to_owned(),
            created_at: Utc::now(),
            attachment_ids: Vec::new(),
            is_placeholder: true,
        }
    }
}
