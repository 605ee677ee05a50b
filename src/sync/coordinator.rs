//! Read-then-reconcile cycle for one list surface.
//!
//! A [`SyncCoordinator`] publishes what the local store already holds,
//! then runs one [`GroupOperation`] that fetches and merges authoritative
//! data, then publishes again. At most one group is in flight per
//! coordinator: `load_data` while a fetch is outstanding still re-runs the
//! local query but starts no network work, and `refresh` is a no-op.
//!
//! Views are delivered on a `tokio::sync::watch` channel. Every publish
//! runs on the [`UiScheduler`], so a local-query publish always lands
//! before the republish triggered by the fetch it started.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, trace, warn, Instrument};

use crate::persistence::store::{Entity, LocalStore};
use crate::scheduler::UiScheduler;
use crate::Result;

use super::error_sink::ErrorSink;
use super::group::GroupOperation;

/// Boxed future returned by [`SyncSource::query_local`].
pub type QueryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<Vec<T>>> + Send + 'a>>;

/// What a coordinator syncs: a local query and the remote work behind it.
pub trait SyncSource: Send + Sync + 'static {
    /// Row type published to observers.
    type Item: Clone + Send + Sync + 'static;

    /// Name used in logs.
    fn name(&self) -> &str;

    /// Store entities whose changes should trigger a republish.
    fn watches(&self) -> &[Entity];

    /// Read and order the cached rows.
    fn query_local(&self) -> QueryFuture<'_, Self::Item>;

    /// Build the fetch-and-merge operations for one sync.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidOperation` if the group cannot be wired.
    fn build_group(&self) -> Result<GroupOperation>;
}

/// A published view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<T> {
    /// Rows in display order.
    pub items: Vec<T>,
    /// Bumped on every successful local query publish.
    pub revision: u64,
    /// Whether a remote fetch is outstanding.
    pub syncing: bool,
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            revision: 0,
            syncing: false,
        }
    }
}

/// Whether a call started network work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStage {
    /// A new group operation was started.
    Started,
    /// A group operation was already outstanding; nothing was started.
    AlreadyInFlight,
}

struct Inner<S: SyncSource> {
    source: S,
    store: LocalStore,
    scheduler: UiScheduler,
    sink: Arc<dyn ErrorSink>,
    view: watch::Sender<Snapshot<S::Item>>,
    in_flight: AtomicBool,
    groups_started: AtomicU64,
    current_group: Mutex<Option<CancellationToken>>,
    cancel: CancellationToken,
}

impl<S: SyncSource> Inner<S> {
    /// Must run on the scheduler.
    fn publish(&self, items: Result<Vec<S::Item>>) {
        let syncing = self.in_flight.load(Ordering::SeqCst);
        match items {
            Ok(items) => {
                let count = items.len();
                self.view.send_modify(|snapshot| {
                    snapshot.items = items;
                    snapshot.revision += 1;
                    snapshot.syncing = syncing;
                });
                trace!(source = %self.source.name(), count, syncing, "view published");
            }
            Err(err) => {
                warn!(source = %self.source.name(), %err, "local query failed");
                self.sink.report(&err);
                self.view.send_modify(|snapshot| snapshot.syncing = syncing);
            }
        }
    }
}

/// Coordinates local reads and remote reconciliation for one source.
pub struct SyncCoordinator<S: SyncSource> {
    inner: Arc<Inner<S>>,
}

impl<S: SyncSource> Clone for SyncCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SyncSource> SyncCoordinator<S> {
    /// Create a coordinator. Nothing runs until [`load_data`](Self::load_data).
    #[must_use]
    pub fn new(
        source: S,
        store: LocalStore,
        scheduler: UiScheduler,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        let (view, _) = watch::channel(Snapshot::default());
        Self {
            inner: Arc::new(Inner {
                source,
                store,
                scheduler,
                sink,
                view,
                in_flight: AtomicBool::new(false),
                groups_started: AtomicU64::new(0),
                current_group: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Observe published views.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<S::Item>> {
        self.inner.view.subscribe()
    }

    /// The most recently published view.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<S::Item> {
        self.inner.view.borrow().clone()
    }

    /// Whether a group operation is outstanding.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Number of group operations started over this coordinator's life.
    #[must_use]
    pub fn groups_started(&self) -> u64 {
        self.inner.groups_started.load(Ordering::SeqCst)
    }

    /// Publish the cached rows, then start a remote sync unless one is
    /// already outstanding.
    ///
    /// Returns once the local publish is done; the remote stage continues
    /// in the background.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cancelled` if the scheduler has stopped, or the
    /// source's error if its group cannot be built. Local query failures
    /// go to the error sink instead.
    pub async fn load_data(&self) -> Result<RemoteStage> {
        let claimed = self.try_claim();

        if let Err(err) = self.publish_local().await {
            if claimed {
                self.release();
            }
            return Err(err);
        }

        if !claimed {
            debug!(source = %self.inner.source.name(), "remote fetch already in flight");
            return Ok(RemoteStage::AlreadyInFlight);
        }
        self.start_group()
    }

    /// Start a remote sync without re-reading the cache first. A no-op
    /// while one is outstanding.
    ///
    /// # Errors
    ///
    /// Same as [`load_data`](Self::load_data).
    pub async fn refresh(&self) -> Result<RemoteStage> {
        if !self.try_claim() {
            debug!(source = %self.inner.source.name(), "refresh ignored; fetch in flight");
            return Ok(RemoteStage::AlreadyInFlight);
        }

        let inner = Arc::clone(&self.inner);
        let marked = self
            .inner
            .scheduler
            .run(async move { inner.view.send_modify(|snapshot| snapshot.syncing = true) })
            .await;
        if let Err(err) = marked {
            self.release();
            return Err(err);
        }
        self.start_group()
    }

    /// Wait until no group operation is outstanding and return the view.
    pub async fn settled(&self) -> Snapshot<S::Item> {
        let mut rx = self.inner.view.subscribe();
        let settled = match rx.wait_for(|snapshot| !snapshot.syncing).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        };
        settled
    }

    /// Republish whenever the store reports a change to a watched entity
    /// while no fetch is outstanding. Runs until [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn watch_store(&self) -> JoinHandle<()> {
        let mut changes = self.inner.store.subscribe();
        let this = self.clone();
        let cancel = self.inner.cancel.clone();
        let span = info_span!("store_watch", source = %self.inner.source.name());

        tokio::spawn(
            async move {
                loop {
                    let change = tokio::select! {
                        () = cancel.cancelled() => break,
                        change = changes.recv() => change,
                    };

                    let relevant = match change {
                        Ok(change) => this.inner.source.watches().contains(&change.entity),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "store change listener lagged");
                            true
                        }
                        Err(RecvError::Closed) => break,
                    };

                    if !relevant {
                        continue;
                    }
                    if this.is_syncing() {
                        // The completion republish covers this change.
                        trace!("change during sync");
                        continue;
                    }
                    if let Err(err) = this.publish_local().await {
                        warn!(%err, "store watch stopped");
                        break;
                    }
                }
            }
            .instrument(span),
        )
    }

    /// Stop the store watcher and cancel not-yet-started operations of the
    /// outstanding group.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Ok(current) = self.inner.current_group.lock() {
            if let Some(token) = current.as_ref() {
                token.cancel();
            }
        }
    }

    fn try_claim(&self) -> bool {
        self.inner
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn release(&self) {
        self.inner.in_flight.store(false, Ordering::SeqCst);
        self.inner
            .view
            .send_modify(|snapshot| snapshot.syncing = false);
    }

    async fn publish_local(&self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .scheduler
            .run(async move {
                let items = inner.source.query_local().await;
                inner.publish(items);
            })
            .await
    }

    fn start_group(&self) -> Result<RemoteStage> {
        let group = match self.inner.source.build_group() {
            Ok(group) => group,
            Err(err) => {
                self.release();
                return Err(err);
            }
        };

        if let Ok(mut current) = self.inner.current_group.lock() {
            *current = Some(group.cancellation_token());
        }
        if self.inner.cancel.is_cancelled() {
            group.cancellation_token().cancel();
        }

        let started = self.inner.groups_started.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(source = %self.inner.source.name(), group = %group.name(), started, "remote fetch started");

        let handle = group.spawn(Arc::clone(&self.inner.sink));
        let this = self.clone();
        let span = info_span!("sync_completion", source = %self.inner.source.name());

        tokio::spawn(
            async move {
                if let Err(err) = handle.wait().await {
                    this.inner.sink.report(&err);
                }
                this.finish_remote().await;
            }
            .instrument(span),
        );

        Ok(RemoteStage::Started)
    }

    async fn finish_remote(&self) {
        let inner = Arc::clone(&self.inner);
        let republished = self
            .inner
            .scheduler
            .run(async move {
                let items = inner.source.query_local().await;
                inner.in_flight.store(false, Ordering::SeqCst);
                if let Ok(mut current) = inner.current_group.lock() {
                    *current = None;
                }
                inner.publish(items);
            })
            .await;

        if let Err(err) = republished {
            warn!(%err, "completion republish skipped");
            self.release();
        }
    }
}
