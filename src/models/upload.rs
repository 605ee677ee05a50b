//! File upload batch types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::AppError;

/// Destination of an upload batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FileUploadContext {
    /// Files attached to a comment on the caller's submission.
    SubmissionComment {
        /// Course identifier.
        course_id: String,
        /// Assignment identifier.
        assignment_id: String,
    },
}

/// A local file queued for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Path on disk.
    pub path: PathBuf,
    /// File name reported to the server.
    pub name: String,
}

impl UploadFile {
    /// Queue a file, naming it after the last path component.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map_or_else(|| "file".to_owned(), |n| n.to_string_lossy().into_owned());
        Self { path, name }
    }
}

/// A set of files to upload for one user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// Batch identifier, unique per action.
    pub batch_id: String,
    /// Upload destination.
    pub context: FileUploadContext,
    /// Files in upload order.
    pub files: Vec<UploadFile>,
}

/// Progress of an upload batch.
///
/// `Completed` and `Failed` are terminal; a batch reaches exactly one of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchState {
    /// Files are queued and the upload has not begun.
    Staged,
    /// Upload in progress.
    Uploading {
        /// Files finished so far.
        completed: usize,
        /// Files in the batch.
        total: usize,
    },
    /// Every file uploaded.
    Completed {
        /// Server file identifiers in upload order.
        file_ids: Vec<String>,
    },
    /// The batch failed.
    Failed {
        /// Cause of the failure.
        error: AppError,
    },
}

impl BatchState {
    /// Whether this state ends the batch.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}
