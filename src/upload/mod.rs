//! File-upload subsystem boundary.
//!
//! An uploader turns a [`BatchRequest`] into an [`UploadBatch`]: a stream of
//! [`BatchState`] transitions `Staged → Uploading → Completed | Failed`.
//! Consumers normally call [`UploadBatch::terminal`], which acts on the
//! first terminal state and then drops the subscription so a misbehaving
//! uploader that reports completion twice is only heard once.

pub mod http;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::upload::{BatchRequest, BatchState};
use crate::{AppError, Result};

/// Starts upload batches.
pub trait FileUploader: Send + Sync {
    /// Begin uploading `request`. The returned batch stops when `cancel`
    /// fires.
    fn upload(&self, request: BatchRequest, cancel: CancellationToken) -> UploadBatch;
}

/// Sending half of a batch's state stream, held by uploader implementations.
#[derive(Debug, Clone)]
pub struct BatchPublisher {
    tx: mpsc::UnboundedSender<BatchState>,
}

impl BatchPublisher {
    /// Report a state transition. Returns `false` once nobody is listening.
    pub fn publish(&self, state: BatchState) -> bool {
        self.tx.send(state).is_ok()
    }

    /// Whether the consumer has unsubscribed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of one upload batch.
#[derive(Debug)]
pub struct UploadBatch {
    batch_id: String,
    states: Option<mpsc::UnboundedReceiver<BatchState>>,
    cancel: CancellationToken,
}

impl UploadBatch {
    /// Create a connected publisher/batch pair.
    #[must_use]
    pub fn channel(batch_id: &str, cancel: CancellationToken) -> (BatchPublisher, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            BatchPublisher { tx },
            Self {
                batch_id: batch_id.to_owned(),
                states: Some(rx),
                cancel,
            },
        )
    }

    /// Batch identifier.
    #[must_use]
    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    /// Whether state notifications are still being received.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.states.is_some()
    }

    /// Next raw state, or `None` once the stream ended or was unsubscribed.
    pub async fn next_state(&mut self) -> Option<BatchState> {
        match self.states.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Wait for the batch outcome.
    ///
    /// `Staged` and `Uploading` are skipped. The first terminal state is
    /// returned and the subscription dropped; any later notification is
    /// never delivered.
    ///
    /// # Errors
    ///
    /// Returns the batch's own error on `Failed`, `AppError::Cancelled` if
    /// the stream ends after cancellation, and `AppError::Upload` if it ends
    /// without a terminal state.
    pub async fn terminal(&mut self) -> Result<Vec<String>> {
        loop {
            match self.next_state().await {
                Some(BatchState::Staged) => {
                    debug!(batch_id = %self.batch_id, "batch staged");
                }
                Some(BatchState::Uploading { completed, total }) => {
                    debug!(batch_id = %self.batch_id, completed, total, "batch uploading");
                }
                Some(BatchState::Completed { file_ids }) => {
                    self.remove_all_subscribers();
                    return Ok(file_ids);
                }
                Some(BatchState::Failed { error }) => {
                    self.remove_all_subscribers();
                    return Err(error);
                }
                None if self.cancel.is_cancelled() => {
                    return Err(AppError::Cancelled(format!(
                        "upload batch {} cancelled",
                        self.batch_id
                    )));
                }
                None => {
                    return Err(AppError::Upload(format!(
                        "upload batch {} ended without a result",
                        self.batch_id
                    )));
                }
            }
        }
    }

    /// Stop receiving state notifications.
    pub fn remove_all_subscribers(&mut self) {
        self.states = None;
    }

    /// Abort the upload.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
