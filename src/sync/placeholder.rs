//! Identifiers for optimistic placeholder records.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::persistence::comment_repo::CommentRepo;
use crate::Result;

/// Prefix shared by every placeholder id.
pub const PLACEHOLDER_PREFIX: &str = "placeholder-";

/// Source of fresh placeholder ids.
pub trait IdGenerator: Send + Sync {
    /// Return an id never returned before by this generator.
    fn next_id(&self) -> String;
}

/// Monotonic counter producing `placeholder-1`, `placeholder-2`, ...
///
/// Each pipeline owner injects its own instance; ids are unique and
/// strictly increasing per instance. Use [`resume`](Self::resume) against a
/// persistent cache so new ids never collide with orphaned placeholders.
#[derive(Debug)]
pub struct PlaceholderIds {
    next: AtomicU64,
}

impl PlaceholderIds {
    /// Start counting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Start counting at `first`.
    #[must_use]
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Continue after the highest placeholder id already stored.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the stored placeholders cannot be read.
    pub async fn resume(comments: &CommentRepo) -> Result<Self> {
        let last = comments.max_placeholder_suffix().await?;
        Ok(Self::starting_at(last.saturating_add(1)))
    }
}

impl Default for PlaceholderIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for PlaceholderIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{PLACEHOLDER_PREFIX}{n}")
    }
}

/// Whether `id` names a placeholder.
#[must_use]
pub fn is_placeholder_id(id: &str) -> bool {
    placeholder_suffix(id).is_some()
}

/// Numeric suffix of a placeholder id.
#[must_use]
pub fn placeholder_suffix(id: &str) -> Option<u64> {
    id.strip_prefix(PLACEHOLDER_PREFIX)?.parse().ok()
}
