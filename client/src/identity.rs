//! Identity provider contract.
//!
//! Tally does not own authentication. The provider issues a stable user
//! identifier plus an optional display name, and emits sign-in/sign-out
//! events; everything else about credential handling is the provider's
//! problem.

use crate::error::StoreError;
use crate::store::Subscription;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Stable identifier, the key of the user's counter record.
    pub uid: String,
    pub email: Option<String>,
    /// Free-text display name; normalized into initials before use.
    pub display_name: Option<String>,
}

/// Auth-change events: `Some` on sign-in, `None` on sign-out.
pub type AuthSubscription = Subscription<Option<UserProfile>>;

/// External identity collaborator.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The currently signed-in user, if any.
    async fn current_user(&self) -> Option<UserProfile>;

    /// Persist a new display name on the user's profile.
    async fn update_display_name(&self, uid: &str, name: &str) -> Result<(), StoreError>;

    /// End the provider session for this user.
    async fn sign_out(&self, uid: &str) -> Result<(), StoreError>;

    /// Subscribe to sign-in/sign-out events.
    fn subscribe_auth(&self) -> AuthSubscription;
}
