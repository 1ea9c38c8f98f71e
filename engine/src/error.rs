//! Error types for the Tally engine.

use thiserror::Error;

/// All possible errors from the Tally engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("initials must contain 1-4 letters or digits")]
    EmptyInitials,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
