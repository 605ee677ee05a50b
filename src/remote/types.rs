//! Wire types for the LMS REST API and their mapping onto domain records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::comment::SubmissionComment;
use crate::models::course::Course;
use crate::models::grading_period::GradingPeriod;

/// Course as returned by `GET /api/v1/courses`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiCourse {
    /// Course identifier.
    pub id: String,
    /// Course name.
    #[serde(default)]
    pub name: Option<String>,
    /// Course code.
    #[serde(default)]
    pub course_code: Option<String>,
    /// Card image URL (requires `include[]=course_image`).
    #[serde(default)]
    pub image_download_url: Option<String>,
}

impl From<ApiCourse> for Course {
    fn from(api: ApiCourse) -> Self {
        Self {
            id: api.id,
            name: api.name,
            course_code: api.course_code,
            image_download_url: api.image_download_url,
            color: None,
        }
    }
}

/// Response of `GET /api/v1/users/self/colors`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiCustomColors {
    /// Colors keyed by asset string, e.g. `course_42`.
    #[serde(default)]
    pub custom_colors: HashMap<String, String>,
}

impl ApiCustomColors {
    /// Colors of courses only, keyed by bare course id.
    #[must_use]
    pub fn course_colors(&self) -> HashMap<String, String> {
        self.custom_colors
            .iter()
            .filter_map(|(asset, color)| {
                asset
                    .strip_prefix("course_")
                    .filter(|id| !id.is_empty())
                    .map(|id| (id.to_owned(), color.clone()))
            })
            .collect()
    }
}

/// Page wrapper of `GET /api/v1/courses/:id/grading_periods`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiGradingPeriodPage {
    /// Periods on this page.
    #[serde(default)]
    pub grading_periods: Vec<ApiGradingPeriod>,
}

/// Grading period as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiGradingPeriod {
    /// Period identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Start of the period.
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    /// End of the period.
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl ApiGradingPeriod {
    /// Map onto a cached record owned by `course_id`.
    #[must_use]
    pub fn into_period(self, course_id: &str) -> GradingPeriod {
        GradingPeriod {
            id: self.id,
            course_id: course_id.to_owned(),
            title: self.title,
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

/// Comment portion of a grade mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GradeComment {
    /// Comment text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_comment: Option<String>,
    /// Uploaded files to attach.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub file_ids: Vec<String>,
    /// Send the comment to the whole group.
    pub group_comment: bool,
}

/// Grade portion of a grade mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GradeSubmission {
    /// Grade to post.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posted_grade: Option<String>,
}

/// JSON body of `PUT .../submissions/:user_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PutSubmissionGradeBody {
    /// Comment to add.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<GradeComment>,
    /// Grade to set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<GradeSubmission>,
}

/// A grade/comment mutation addressed to one user's submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutSubmissionGradeRequest {
    /// Course identifier.
    pub course_id: String,
    /// Assignment identifier.
    pub assignment_id: String,
    /// Submitting user identifier.
    pub user_id: String,
    /// Request body.
    pub body: PutSubmissionGradeBody,
}

impl PutSubmissionGradeRequest {
    /// Request path relative to the API root.
    #[must_use]
    pub fn path(&self) -> String {
        format!(
            "/api/v1/courses/{}/assignments/{}/submissions/{}",
            self.course_id, self.assignment_id, self.user_id
        )
    }
}

/// Submission as returned by the grade mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiSubmission {
    /// Submission identifier.
    pub id: String,
    /// Comments, oldest first.
    #[serde(default)]
    pub submission_comments: Option<Vec<ApiSubmissionComment>>,
}

/// Comment author details.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiCommentAuthor {
    /// Avatar image URL.
    #[serde(default)]
    pub avatar_image_url: Option<String>,
}

/// File attached to a comment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiAttachment {
    /// File identifier.
    pub id: String,
}

/// Submission comment as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiSubmissionComment {
    /// Comment identifier.
    pub id: String,
    /// Author user identifier.
    pub author_id: String,
    /// Author display name.
    pub author_name: String,
    /// Author details.
    #[serde(default)]
    pub author: Option<ApiCommentAuthor>,
    /// Comment body.
    #[serde(default)]
    pub comment: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Attached files.
    #[serde(default)]
    pub attachments: Option<Vec<ApiAttachment>>,
}

impl ApiSubmissionComment {
    /// Map onto a confirmed (non-placeholder) record on `submission_id`.
    #[must_use]
    pub fn into_comment(self, submission_id: &str) -> SubmissionComment {
        SubmissionComment {
            id: self.id,
            submission_id: submission_id.to_owned(),
            author_id: self.author_id,
            author_name: self.author_name,
            author_avatar_url: self.author.and_then(|a| a.avatar_image_url),
            comment: self.comment,
            created_at: self.created_at,
            attachment_ids: self
                .attachments
                .unwrap_or_default()
                .into_iter()
                .map(|a| a.id)
                .collect(),
            is_placeholder: false,
        }
    }
}

/// Upload slot returned by a file-upload preflight request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiUploadTarget {
    /// Where to send the file bytes.
    pub upload_url: String,
    /// Parameters to send along with the bytes.
    #[serde(default)]
    pub upload_params: HashMap<String, String>,
}

/// File record returned once an upload lands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiFile {
    /// File identifier.
    pub id: String,
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header.
#[must_use]
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_owned)
    })
}
