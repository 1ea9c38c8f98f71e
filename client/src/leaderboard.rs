//! Leaderboard watcher.
//!
//! Holds exactly one top-N query subscription while open and republishes
//! rows through a watch channel. Closing the watcher drops the task and
//! with it the subscription registration.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::store::{DocumentStore, LeaderboardRow};

/// Published leaderboard state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaderboardState {
    pub rows: Vec<LeaderboardRow>,
    /// True until the first delivery arrives.
    pub loading: bool,
    /// Last subscription error, if any.
    pub error: Option<String>,
}

/// An open leaderboard panel.
pub struct Leaderboard {
    state_rx: watch::Receiver<LeaderboardState>,
    task: JoinHandle<()>,
}

impl Leaderboard {
    /// Open the leaderboard: subscribe to the top-N query and keep the
    /// published rows current.
    pub fn open<S>(store: Arc<S>, limit: usize) -> Self
    where
        S: DocumentStore + 'static,
    {
        let (state_tx, state_rx) = watch::channel(LeaderboardState {
            rows: Vec::new(),
            loading: true,
            error: None,
        });

        let task = tokio::spawn(async move {
            let mut sub = store.subscribe_leaderboard(limit);
            while let Some(event) = sub.next().await {
                let state = match event {
                    Ok(rows) => LeaderboardState {
                        rows,
                        loading: false,
                        error: None,
                    },
                    Err(e) => LeaderboardState {
                        rows: state_tx.borrow().rows.clone(),
                        loading: false,
                        error: Some(e.to_string()),
                    },
                };
                if state_tx.send(state).is_err() {
                    break;
                }
            }
        });

        Self { state_rx, task }
    }

    /// Watch the published rows.
    pub fn state(&self) -> watch::Receiver<LeaderboardState> {
        self.state_rx.clone()
    }

    /// The current rows.
    pub fn current(&self) -> LeaderboardState {
        self.state_rx.borrow().clone()
    }

    /// Close the panel and release the query subscription.
    pub fn close(self) {}
}

impl Drop for Leaderboard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
