//! Unified error handling for the client.

use thiserror::Error;

/// Failure reported by a remote collaborator (identity provider or
/// document store).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("write rejected: {0}")]
    WriteFailed(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Application error type.
///
/// None of these are fatal: every variant maps to a status message the
/// session keeps running past.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Failed to read the initial counter record. The accumulator stays at
    /// zero until a later read or notification resolves it.
    #[error("failed to load score: {0}")]
    Init(#[source] StoreError),

    /// A remote increment failed. The amount has been restored to pending
    /// and is retried on the next debounce cycle or the sign-out flush.
    #[error("failed to save clicks: {0}")]
    Flush(#[source] StoreError),

    /// The live-update channel dropped. Local counts are unaffected.
    #[error("live updates interrupted: {0}")]
    Subscription(#[source] StoreError),

    /// Rejected before any remote call.
    #[error(transparent)]
    Validation(#[from] tally_engine::Error),

    /// The identity provider or the store refused the initials write.
    #[error("failed to update initials: {0}")]
    Initials(#[source] StoreError),

    /// The identity provider refused to end the session. Local state has
    /// already been cleared by the time this surfaces.
    #[error("sign out failed: {0}")]
    SignOut(#[source] StoreError),

    /// An initials save is already in progress.
    #[error("a save is already in progress")]
    SaveInProgress,

    /// The session driver has shut down.
    #[error("session closed")]
    SessionClosed,
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
