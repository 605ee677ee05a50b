//! Out-of-band error reporting.
//!
//! Failures that have no direct caller to return to (a member of a group
//! operation, a local query run from a change notification) are handed to
//! an [`ErrorSink`], the engine's equivalent of an error toast.

use tokio::sync::mpsc;
use tracing::error;

use crate::AppError;

/// Receives errors that cannot be returned to a caller.
pub trait ErrorSink: Send + Sync {
    /// Report one failure.
    fn report(&self, error: &AppError);
}

/// Sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&self, err: &AppError) {
        error!(%err, "sync error");
    }
}

/// Sink that forwards every error over a channel.
#[derive(Debug, Clone)]
pub struct ChannelErrorSink {
    tx: mpsc::UnboundedSender<AppError>,
}

impl ChannelErrorSink {
    /// Create a sink and the receiver its errors arrive on.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AppError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ErrorSink for ChannelErrorSink {
    fn report(&self, err: &AppError) {
        if self.tx.send(err.clone()).is_err() {
            error!(%err, "error sink receiver dropped");
        }
    }
}
