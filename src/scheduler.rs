//! Serial executor standing in for the UI thread.
//!
//! Local store writes and view publishes must not interleave. Rather than
//! relying on an ambient "main thread", work that touches them is shipped
//! to a [`UiScheduler`], whose single task runs jobs one at a time in the
//! order they were submitted. Network work stays on the regular runtime and
//! only hops onto the scheduler to apply its results.
//!
//! Jobs must not call [`UiScheduler::run`] themselves: the nested job would
//! queue behind its caller and never start.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use crate::{AppError, Result};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Handle for submitting work to the serial executor. Cheap to clone.
#[derive(Clone)]
pub struct UiScheduler {
    tx: mpsc::UnboundedSender<Job>,
}

impl UiScheduler {
    /// Start the executor task. It stops when `cancel` fires or every
    /// handle is dropped; queued jobs that have not started are discarded.
    #[must_use]
    pub fn spawn(cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let handle = tokio::spawn(
            async move {
                loop {
                    let job = tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            debug!("ui scheduler cancelled");
                            break;
                        }
                        job = rx.recv() => match job {
                            Some(job) => job,
                            None => break,
                        },
                    };
                    job.await;
                }
            }
            .instrument(info_span!("ui_scheduler")),
        );

        (Self { tx }, handle)
    }

    /// Run `fut` on the executor and wait for its output.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cancelled` if the executor has stopped or stops
    /// before the job completes.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = done_tx.send(fut.await);
        });

        self.tx
            .send(job)
            .map_err(|_| AppError::Cancelled("ui scheduler stopped".into()))?;

        done_rx
            .await
            .map_err(|_| AppError::Cancelled("ui scheduler dropped the job".into()))
    }

    /// Whether the executor still accepts work.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}
