//! The local store: a `SQLite` pool paired with a change fan-out channel.
//!
//! Repositories commit through the pool and then call [`LocalStore::notify`]
//! exactly once per committed write. Failed writes roll back and publish
//! nothing, so subscribers only ever hear about durable state.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use super::db::Database;

/// Kind of record a change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    /// `course` table.
    Course,
    /// `grading_period` table.
    GradingPeriod,
    /// `submission_comment` table.
    SubmissionComment,
}

/// A committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    /// Table that changed.
    pub entity: Entity,
    /// Identifiers inserted, updated, or deleted.
    pub ids: Vec<String>,
}

/// Shared handle to the cache and its change channel.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Database>,
    changes: broadcast::Sender<StoreChange>,
}

impl LocalStore {
    /// Wrap a pool; `change_buffer` bounds how far a slow subscriber may lag.
    #[must_use]
    pub fn new(db: Arc<Database>, change_buffer: usize) -> Self {
        let (changes, _) = broadcast::channel(change_buffer.max(1));
        Self { db, changes }
    }

    /// The underlying pool.
    #[must_use]
    pub fn db(&self) -> &Database {
        self.db.as_ref()
    }

    /// Register for change notifications. Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Publish a committed change to all current subscribers.
    pub fn notify(&self, entity: Entity, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        // No subscribers is not an error.
        let receivers = self.changes.send(StoreChange { entity, ids }).unwrap_or(0);
        trace!(?entity, receivers, "store change published");
    }
}
