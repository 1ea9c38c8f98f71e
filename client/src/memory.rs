//! In-memory backend implementing both collaborator contracts.
//!
//! Used by the integration tests and the simulation binary. The point of
//! this backend is not persistence: it reproduces the delivery semantics
//! the session controller has to survive, in particular the local echo a
//! latency-compensated store emits before the server confirms a write.
//!
//! One [`MemoryBackend`] plays the hosted service; each [`MemoryClient`]
//! obtained from it plays one client SDK instance. Echoes are delivered
//! only to subscriptions registered through the writing client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tally_engine::{Delta, SnapshotOrigin};
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::identity::{AuthSubscription, IdentityProvider, UserProfile};
use crate::store::{
    CounterDoc, CounterSnapshot, CounterSubscription, DocumentStore, LeaderboardRow,
    LeaderboardSubscription, Subscription,
};

/// A registered user, as the identity service would hold it.
#[derive(Debug, Clone)]
struct StoredUser {
    email: Option<String>,
    display_name: Option<String>,
}

struct CounterSub {
    uid: String,
    client_id: String,
    tx: mpsc::UnboundedSender<Result<CounterSnapshot, StoreError>>,
}

struct BoardSub {
    limit: usize,
    tx: mpsc::UnboundedSender<Result<Vec<LeaderboardRow>, StoreError>>,
}

struct AuthSub {
    client_id: String,
    tx: mpsc::UnboundedSender<Option<UserProfile>>,
}

#[derive(Default)]
struct Inner {
    users: DashMap<String, StoredUser>,
    docs: DashMap<String, CounterDoc>,
    counter_subs: DashMap<String, CounterSub>,
    board_subs: DashMap<String, BoardSub>,
    auth_subs: DashMap<String, AuthSub>,
    /// Every increment that reached the store, in arrival order.
    increments: Mutex<Vec<(String, Delta)>>,
    fail_next_increment: AtomicBool,
    fail_next_read: AtomicBool,
}

impl Inner {
    /// Deliver a snapshot of `uid`'s record to matching subscriptions.
    ///
    /// `only_client` restricts delivery to one client's subscriptions,
    /// which is how local echoes stay local.
    fn emit_counter(
        &self,
        uid: &str,
        doc: &CounterDoc,
        origin: SnapshotOrigin,
        only_client: Option<&str>,
    ) {
        for entry in self.counter_subs.iter() {
            let sub = entry.value();
            if sub.uid != uid {
                continue;
            }
            if let Some(client_id) = only_client {
                if sub.client_id != client_id {
                    continue;
                }
            }
            let _ = sub.tx.send(Ok(CounterSnapshot {
                doc: doc.clone(),
                origin,
            }));
        }
    }

    /// Re-deliver the leaderboard to every query subscription.
    fn emit_board(&self) {
        for entry in self.board_subs.iter() {
            let sub = entry.value();
            let _ = sub.tx.send(Ok(self.top_rows(sub.limit)));
        }
    }

    /// Top-N rows ordered by clicks descending, uid ascending on ties.
    fn top_rows(&self, limit: usize) -> Vec<LeaderboardRow> {
        let mut rows: Vec<LeaderboardRow> = self
            .docs
            .iter()
            .map(|entry| LeaderboardRow {
                uid: entry.key().clone(),
                initials: entry.value().initials.clone(),
                clicks: entry.value().clicks,
            })
            .collect();

        rows.sort_by(|a, b| b.clicks.cmp(&a.clicks).then_with(|| a.uid.cmp(&b.uid)));
        rows.truncate(limit);
        rows
    }

    fn emit_auth(&self, client_id: &str, profile: Option<UserProfile>) {
        for entry in self.auth_subs.iter() {
            let sub = entry.value();
            if sub.client_id == client_id {
                let _ = sub.tx.send(profile.clone());
            }
        }
    }
}

/// The hosted service: user registry, counter documents, subscriptions.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with the identity service.
    pub fn add_user(&self, uid: &str, email: Option<&str>, display_name: Option<&str>) {
        self.inner.users.insert(
            uid.to_string(),
            StoredUser {
                email: email.map(str::to_string),
                display_name: display_name.map(str::to_string),
            },
        );
    }

    /// Hand out one client SDK instance.
    pub fn client(&self) -> MemoryClient {
        MemoryClient {
            inner: self.inner.clone(),
            client_id: uuid::Uuid::new_v4().to_string(),
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Current state of a counter record, for assertions.
    pub fn doc(&self, uid: &str) -> Option<CounterDoc> {
        self.inner.docs.get(uid).map(|entry| entry.value().clone())
    }

    /// Every increment the store accepted, in arrival order.
    pub fn increment_log(&self) -> Vec<(String, Delta)> {
        self.inner.increments.lock().unwrap().clone()
    }

    /// Make exactly the next increment fail with a write error.
    pub fn fail_next_increment(&self) {
        self.inner.fail_next_increment.store(true, Ordering::SeqCst);
    }

    /// Make exactly the next counter read fail.
    pub fn fail_next_read(&self) {
        self.inner.fail_next_read.store(true, Ordering::SeqCst);
    }

    /// Number of live counter subscriptions, for release assertions.
    pub fn counter_subscription_count(&self) -> usize {
        self.inner.counter_subs.len()
    }

    /// Number of live leaderboard subscriptions.
    pub fn board_subscription_count(&self) -> usize {
        self.inner.board_subs.len()
    }
}

/// One client SDK instance tied to a [`MemoryBackend`].
#[derive(Clone)]
pub struct MemoryClient {
    inner: Arc<Inner>,
    client_id: String,
    current: Arc<Mutex<Option<UserProfile>>>,
}

impl MemoryClient {
    /// Sign in as a registered user.
    pub async fn sign_in(&self, uid: &str) -> Result<UserProfile, StoreError> {
        let user = self
            .inner
            .users
            .get(uid)
            .ok_or_else(|| StoreError::NotFound(format!("user {uid}")))?;

        let profile = UserProfile {
            uid: uid.to_string(),
            email: user.value().email.clone(),
            display_name: user.value().display_name.clone(),
        };
        drop(user);

        *self.current.lock().unwrap() = Some(profile.clone());
        self.inner.emit_auth(&self.client_id, Some(profile.clone()));
        Ok(profile)
    }
}

#[async_trait]
impl IdentityProvider for MemoryClient {
    async fn current_user(&self) -> Option<UserProfile> {
        self.current.lock().unwrap().clone()
    }

    async fn update_display_name(&self, uid: &str, name: &str) -> Result<(), StoreError> {
        let mut user = self
            .inner
            .users
            .get_mut(uid)
            .ok_or_else(|| StoreError::NotFound(format!("user {uid}")))?;
        user.value_mut().display_name = Some(name.to_string());
        drop(user);

        let mut current = self.current.lock().unwrap();
        if let Some(profile) = current.as_mut() {
            if profile.uid == uid {
                profile.display_name = Some(name.to_string());
            }
        }
        Ok(())
    }

    async fn sign_out(&self, _uid: &str) -> Result<(), StoreError> {
        *self.current.lock().unwrap() = None;
        self.inner.emit_auth(&self.client_id, None);
        Ok(())
    }

    fn subscribe_auth(&self) -> AuthSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub_id = uuid::Uuid::new_v4().to_string();

        self.inner.auth_subs.insert(
            sub_id.clone(),
            AuthSub {
                client_id: self.client_id.clone(),
                tx,
            },
        );

        let inner = self.inner.clone();
        Subscription::new(rx, move || {
            inner.auth_subs.remove(&sub_id);
        })
    }
}

#[async_trait]
impl DocumentStore for MemoryClient {
    async fn get_counter(&self, uid: &str) -> Result<Option<CounterDoc>, StoreError> {
        if self.inner.fail_next_read.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        Ok(self.inner.docs.get(uid).map(|entry| entry.value().clone()))
    }

    async fn create_counter(
        &self,
        uid: &str,
        initials: Option<&str>,
    ) -> Result<CounterDoc, StoreError> {
        let now = Utc::now();
        let doc = self
            .inner
            .docs
            .entry(uid.to_string())
            .or_insert_with(|| CounterDoc {
                clicks: 0,
                initials: initials.map(str::to_string),
                created_at: now,
                updated_at: now,
            })
            .value()
            .clone();

        self.inner
            .emit_counter(uid, &doc, SnapshotOrigin::Confirmed, None);
        self.inner.emit_board();
        Ok(doc)
    }

    async fn set_initials(&self, uid: &str, initials: &str) -> Result<(), StoreError> {
        let doc = {
            let mut entry = self
                .inner
                .docs
                .get_mut(uid)
                .ok_or_else(|| StoreError::NotFound(format!("counter {uid}")))?;
            let doc = entry.value_mut();
            doc.initials = Some(initials.to_string());
            doc.updated_at = Utc::now();
            doc.clone()
        };

        // Echo to the writer first, then confirm to everyone.
        self.inner
            .emit_counter(uid, &doc, SnapshotOrigin::LocalEcho, Some(&self.client_id));
        self.inner
            .emit_counter(uid, &doc, SnapshotOrigin::Confirmed, None);
        self.inner.emit_board();
        Ok(())
    }

    async fn increment_clicks(
        &self,
        uid: &str,
        amount: Delta,
        initials: Option<&str>,
    ) -> Result<(), StoreError> {
        if self.inner.fail_next_increment.swap(false, Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("injected write failure".into()));
        }

        let now = Utc::now();
        let doc = {
            // Merge semantics: the increment creates the record if needed.
            let mut entry = self
                .inner
                .docs
                .entry(uid.to_string())
                .or_insert_with(|| CounterDoc {
                    clicks: 0,
                    initials: None,
                    created_at: now,
                    updated_at: now,
                });
            let doc = entry.value_mut();
            doc.clicks = doc.clicks.saturating_add(amount);
            if let Some(initials) = initials {
                doc.initials = Some(initials.to_string());
            }
            doc.updated_at = now;
            doc.clone()
        };

        self.inner
            .increments
            .lock()
            .unwrap()
            .push((uid.to_string(), amount));

        // Latency-compensated delivery order: the writer sees its own echo
        // before the confirmed value reaches everyone.
        self.inner
            .emit_counter(uid, &doc, SnapshotOrigin::LocalEcho, Some(&self.client_id));
        self.inner
            .emit_counter(uid, &doc, SnapshotOrigin::Confirmed, None);
        self.inner.emit_board();
        Ok(())
    }

    fn subscribe_counter(&self, uid: &str) -> CounterSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub_id = uuid::Uuid::new_v4().to_string();

        // Initial snapshot, like any live query that starts with current state.
        if let Some(doc) = self.inner.docs.get(uid) {
            let _ = tx.send(Ok(CounterSnapshot {
                doc: doc.value().clone(),
                origin: SnapshotOrigin::Confirmed,
            }));
        }

        self.inner.counter_subs.insert(
            sub_id.clone(),
            CounterSub {
                uid: uid.to_string(),
                client_id: self.client_id.clone(),
                tx,
            },
        );

        tracing::debug!(sub_id = %sub_id, uid = %uid, "counter subscription registered");

        let inner = self.inner.clone();
        Subscription::new(rx, move || {
            inner.counter_subs.remove(&sub_id);
        })
    }

    fn subscribe_leaderboard(&self, limit: usize) -> LeaderboardSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub_id = uuid::Uuid::new_v4().to_string();

        let _ = tx.send(Ok(self.inner.top_rows(limit)));

        self.inner
            .board_subs
            .insert(sub_id.clone(), BoardSub { limit, tx });

        let inner = self.inner.clone();
        Subscription::new(rx, move || {
            inner.board_subs.remove(&sub_id);
        })
    }
}
