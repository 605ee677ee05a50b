//! Optimistic "comment with attached files" pipeline.
//!
//! [`CommentUploader::submit`] writes a placeholder comment before
//! returning, so the caller can render it immediately, then uploads the
//! files and posts the comment in the background:
//!
//! 1. no session: fail with `Unauthenticated`, write nothing;
//! 2. insert the placeholder; a failed save ends the operation;
//! 3. upload the batch and wait for its first terminal state;
//! 4. on `Completed`, `PUT` the grade mutation with the file ids and swap
//!    the placeholder for the returned comment in one transaction.
//!
//! Failures after step 2 leave the placeholder in place. Nothing is
//! retried or rolled back; [`PendingComment::cancel`] stops the upload and
//! the mutation but keeps the placeholder.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::models::comment::SubmissionComment;
use crate::models::session::LoginSession;
use crate::models::upload::{BatchRequest, FileUploadContext, UploadFile};
use crate::persistence::comment_repo::CommentRepo;
use crate::remote::types::{GradeComment, PutSubmissionGradeBody, PutSubmissionGradeRequest};
use crate::remote::RemoteApi;
use crate::scheduler::UiScheduler;
use crate::upload::{FileUploader, UploadBatch};
use crate::{AppError, Result};

use super::placeholder::IdGenerator;

/// What to comment on and which files to attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCommentRequest {
    /// Course identifier.
    pub course_id: String,
    /// Assignment identifier.
    pub assignment_id: String,
    /// Submitting user identifier.
    pub user_id: String,
    /// Submission the comment belongs to.
    pub submission_id: String,
    /// Send the comment to the whole group.
    pub is_group: bool,
    /// Upload batch identifier.
    pub batch_id: String,
    /// Files to attach.
    pub files: Vec<UploadFile>,
}

/// Collaborators shared by every submission.
#[derive(Clone)]
pub struct CommentUploader {
    api: Arc<dyn RemoteApi>,
    uploader: Arc<dyn FileUploader>,
    comments: CommentRepo,
    scheduler: UiScheduler,
    ids: Arc<dyn IdGenerator>,
}

/// A submitted comment whose upload is still running.
pub struct PendingComment {
    placeholder: SubmissionComment,
    cancel: CancellationToken,
    task: JoinHandle<Result<SubmissionComment>>,
}

impl PendingComment {
    /// The placeholder written to the store.
    #[must_use]
    pub fn placeholder(&self) -> &SubmissionComment {
        &self.placeholder
    }

    /// Abort the upload batch and the in-flight mutation. The placeholder
    /// stays in the store.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this upload, for use after [`outcome`](Self::outcome)
    /// has taken ownership.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the confirmed comment.
    ///
    /// # Errors
    ///
    /// Returns the upload, network, or persistence error that ended the
    /// operation, or `AppError::Cancelled` after [`cancel`](Self::cancel).
    pub async fn outcome(self) -> Result<SubmissionComment> {
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(AppError::Cancelled(format!("comment upload task ended: {err}"))),
        }
    }
}

impl CommentUploader {
    /// Create the pipeline.
    #[must_use]
    pub fn new(
        api: Arc<dyn RemoteApi>,
        uploader: Arc<dyn FileUploader>,
        comments: CommentRepo,
        scheduler: UiScheduler,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            api,
            uploader,
            comments,
            scheduler,
            ids,
        }
    }

    /// Write a placeholder and start uploading in the background.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthenticated` without writing anything when
    /// `session` is `None`, and the persistence error if the placeholder
    /// cannot be saved. Later failures are reported by
    /// [`PendingComment::outcome`].
    pub async fn submit(
        &self,
        session: Option<&LoginSession>,
        request: FileCommentRequest,
    ) -> Result<PendingComment> {
        let Some(session) = session else {
            return Err(AppError::Unauthenticated(
                "no current session; sign in before commenting".into(),
            ));
        };

        let placeholder = SubmissionComment::placeholder(
            self.ids.next_id(),
            request.submission_id.clone(),
            session,
        );
        let repo = self.comments.clone();
        let to_save = placeholder.clone();
        self.scheduler
            .run(async move { repo.insert(&to_save).await })
            .await??;
        info!(
            placeholder_id = %placeholder.id,
            submission_id = %request.submission_id,
            "placeholder comment saved"
        );

        let cancel = CancellationToken::new();
        let batch = self.uploader.upload(
            BatchRequest {
                batch_id: request.batch_id.clone(),
                context: FileUploadContext::SubmissionComment {
                    course_id: request.course_id.clone(),
                    assignment_id: request.assignment_id.clone(),
                },
                files: request.files.clone(),
            },
            cancel.child_token(),
        );

        let span = info_span!(
            "comment_upload",
            batch_id = %request.batch_id,
            placeholder_id = %placeholder.id
        );
        let task = tokio::spawn(
            self.clone()
                .complete(request, placeholder.id.clone(), batch, cancel.clone())
                .instrument(span),
        );

        Ok(PendingComment {
            placeholder,
            cancel,
            task,
        })
    }

    async fn complete(
        self,
        request: FileCommentRequest,
        placeholder_id: String,
        mut batch: UploadBatch,
        cancel: CancellationToken,
    ) -> Result<SubmissionComment> {
        let uploaded = tokio::select! {
            () = cancel.cancelled() => None,
            result = batch.terminal() => Some(result),
        };
        let file_ids = match uploaded {
            Some(Ok(file_ids)) => file_ids,
            Some(Err(err)) => {
                warn!(%err, "upload batch did not complete; placeholder kept");
                return Err(err);
            }
            None => {
                batch.cancel();
                batch.remove_all_subscribers();
                info!("upload batch cancelled; placeholder kept");
                return Err(AppError::Cancelled(format!(
                    "upload batch {} cancelled",
                    batch.batch_id()
                )));
            }
        };

        let mutation = PutSubmissionGradeRequest {
            course_id: request.course_id,
            assignment_id: request.assignment_id,
            user_id: request.user_id,
            body: PutSubmissionGradeBody {
                comment: Some(GradeComment {
                    text_comment: None,
                    file_ids,
                    group_comment: request.is_group,
                }),
                submission: None,
            },
        };

        let submission = tokio::select! {
            () = cancel.cancelled() => {
                info!("comment mutation cancelled; placeholder kept");
                return Err(AppError::Cancelled("comment mutation cancelled".into()));
            }
            result = self.api.put_submission_grade(&mutation) => result,
        };
        let submission = submission.inspect_err(|err| {
            warn!(%err, "comment mutation failed; placeholder kept");
        })?;

        let Some(confirmed) = submission.submission_comments.and_then(|mut c| c.pop()) else {
            warn!("mutation response carried no comments; placeholder kept");
            return Err(AppError::Network(
                "put submission grade: response has no submission comments".into(),
            ));
        };
        let confirmed = confirmed.into_comment(&request.submission_id);

        let repo = self.comments.clone();
        let replaced = self
            .scheduler
            .run(async move { repo.replace(Some(placeholder_id.as_str()), &confirmed).await })
            .await?
            .inspect_err(|err| warn!(%err, "saving confirmed comment failed"))?;

        info!(comment_id = %replaced.id, files = replaced.attachment_ids.len(), "comment confirmed");
        Ok(replaced)
    }
}
