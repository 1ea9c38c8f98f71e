//! # Tally Client
//!
//! The session layer of Tally: debounced flushing of local clicks into a
//! remote document store, with live-update reconciliation and a
//! leaderboard watcher.
//!
//! The crate owns no persistence and no authentication. Two collaborator
//! contracts cover everything durable:
//!
//! - [`IdentityProvider`] - issues a stable user id and display name,
//!   emits sign-in/sign-out events
//! - [`DocumentStore`] - holds one counter record per user, supports one
//!   atomic increment per flush, live updates flagged with
//!   [`SnapshotOrigin`](tally_engine::SnapshotOrigin), and a sorted top-N
//!   query
//!
//! The counting rules (pending vs in-flight vs confirmed, local-echo
//! suppression, single-flight) live in [`tally_engine`]; this crate adds
//! the timers and the IO around them.
//!
//! ## Lifecycle
//!
//! ```text
//! sign-in  -> ClickSession::start   (lazy record create, subscribe)
//! clicks   -> record_click          (debounce timer restarts per click)
//! idle     -> flush                 (one atomic increment per burst)
//! echo     -> ignored; confirmed value settles in-flight clicks
//! sign-out -> final flush, release subscription, reset, provider sign-out
//! ```
//!
//! [`MemoryBackend`] implements both contracts in memory with the same
//! echo-before-confirmation delivery order a latency-compensated hosted
//! store exhibits; the integration tests and the `simulate` binary run
//! against it.

pub mod config;
pub mod error;
pub mod identity;
pub mod leaderboard;
pub mod memory;
pub mod session;
pub mod store;

// Re-export main types at crate root
pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, StoreError};
pub use identity::{AuthSubscription, IdentityProvider, UserProfile};
pub use leaderboard::{Leaderboard, LeaderboardState};
pub use memory::{MemoryBackend, MemoryClient};
pub use session::{ClickSession, SessionView};
pub use store::{
    CounterDoc, CounterSnapshot, CounterSubscription, DocumentStore, LeaderboardRow,
    LeaderboardSubscription, Subscription,
};
