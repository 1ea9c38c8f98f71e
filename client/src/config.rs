//! Configuration management for the client.

use std::env;
use std::time::Duration;

/// Debounce window applied between the last click and a flush.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Number of rows the leaderboard query asks for.
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Idle duration after the last click before a flush fires.
    pub debounce_window: Duration,
    /// Top-N size for the leaderboard subscription.
    pub leaderboard_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            debounce_window: DEFAULT_DEBOUNCE,
            leaderboard_limit: DEFAULT_LEADERBOARD_LIMIT,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let debounce_window = match env::var("TALLY_DEBOUNCE_MS") {
            Ok(raw) => Duration::from_millis(raw.parse().map_err(|_| ConfigError::InvalidDebounce)?),
            Err(_) => DEFAULT_DEBOUNCE,
        };

        let leaderboard_limit = match env::var("TALLY_LEADERBOARD_LIMIT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidLeaderboardLimit)?,
            Err(_) => DEFAULT_LEADERBOARD_LIMIT,
        };

        Ok(Self {
            debounce_window,
            leaderboard_limit,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TALLY_DEBOUNCE_MS value")]
    InvalidDebounce,

    #[error("Invalid TALLY_LEADERBOARD_LIMIT value")]
    InvalidLeaderboardLimit,
}
