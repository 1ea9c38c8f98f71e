//! Remote document store contract.
//!
//! One counter record per user, keyed by the identity provider's uid. The
//! store owns persistence, atomic increments, live updates, and the sorted
//! top-N query; this crate only consumes them.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_engine::{Clicks, Delta, SnapshotOrigin};
use tokio::sync::mpsc;

/// The counter document stored per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterDoc {
    /// Total confirmed clicks. Mutated only through atomic increments, so
    /// the record stays correct under concurrent writers.
    pub clicks: Clicks,
    /// Normalized display tag for the leaderboard, absent until set.
    pub initials: Option<String>,
    /// Store-assigned creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Store-assigned last-write timestamp.
    pub updated_at: DateTime<Utc>,
}

/// One live-update notification for a counter record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    pub doc: CounterDoc,
    /// Whether this is a not-yet-acknowledged echo of a local write or
    /// server-confirmed state.
    pub origin: SnapshotOrigin,
}

/// One row of the top-N leaderboard query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub uid: String,
    pub initials: Option<String>,
    pub clicks: Clicks,
}

/// A cancellable live-update subscription.
///
/// Dropping the handle (or calling [`cancel`](Self::cancel)) releases the
/// registration synchronously; no further items are delivered afterwards.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    _guard: SubscriptionGuard,
}

impl<T> Subscription<T> {
    /// Wrap a receiver with a cancel action run exactly once on release.
    pub fn new(rx: mpsc::UnboundedReceiver<T>, on_cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            rx,
            _guard: SubscriptionGuard(Some(Box::new(on_cancel))),
        }
    }

    /// Next notification, or `None` once the channel is closed.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next notification if one is already buffered.
    pub fn try_next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Release the registration.
    pub fn cancel(self) {}
}

struct SubscriptionGuard(Option<Box<dyn FnOnce() + Send>>);

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(on_cancel) = self.0.take() {
            on_cancel();
        }
    }
}

impl std::fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGuard").finish_non_exhaustive()
    }
}

/// Counter live updates: snapshots or channel errors.
pub type CounterSubscription = Subscription<Result<CounterSnapshot, StoreError>>;

/// Leaderboard live updates: full top-N rows on every change.
pub type LeaderboardSubscription = Subscription<Result<Vec<LeaderboardRow>, StoreError>>;

/// External document store collaborator.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one counter record.
    async fn get_counter(&self, uid: &str) -> Result<Option<CounterDoc>, StoreError>;

    /// Create the counter record if it does not exist yet. Returns the
    /// record either way; the store assigns timestamps.
    async fn create_counter(
        &self,
        uid: &str,
        initials: Option<&str>,
    ) -> Result<CounterDoc, StoreError>;

    /// Merge-write the initials onto an existing record.
    async fn set_initials(&self, uid: &str, initials: &str) -> Result<(), StoreError>;

    /// Atomically add `amount` to the counter and upsert the initials in
    /// one write. Never an absolute overwrite.
    async fn increment_clicks(
        &self,
        uid: &str,
        amount: Delta,
        initials: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Live updates for one counter record. Writes issued by this same
    /// client are echoed (flagged [`SnapshotOrigin::LocalEcho`]) before
    /// the confirmed value arrives.
    fn subscribe_counter(&self, uid: &str) -> CounterSubscription;

    /// Top-N records ordered by clicks descending, re-delivered on every
    /// confirmed change.
    fn subscribe_leaderboard(&self, limit: usize) -> LeaderboardSubscription;
}
