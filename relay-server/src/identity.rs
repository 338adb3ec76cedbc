//! Reconciliation of verified token claims with local user records.

use std::sync::Arc;

use log::debug;
use thiserror::Error;

use crate::oidc::IdentityClaims;
use crate::users::{LocalUser, UserStore, UserStoreError};

/// Errors that can occur while resolving token claims to a local user
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no local user for username '{0}'")]
    UserNotFound(String),
    #[error(transparent)]
    Store(#[from] UserStoreError),
}

/// Maps verified token claims onto local user records.
pub struct IdentityReconciler {
    users: Arc<dyn UserStore>,
}

impl IdentityReconciler {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Resolve the claims to a local user, creating the record on first
    /// sight of the username. Idempotent: repeated calls with the same
    /// username never create a second record.
    pub async fn resolve_or_create(
        &self,
        claims: &IdentityClaims,
    ) -> Result<LocalUser, IdentityError> {
        let user = self
            .users
            .create_if_absent(&claims.preferred_username, &claims.email)
            .await?;
        debug!(
            "resolved user '{}' for subject '{}'",
            user.username, claims.subject
        );
        Ok(user)
    }

    /// Lookup-only resolution used on the bearer path: a valid token alone
    /// never provisions a local user.
    pub async fn resolve_existing(
        &self,
        claims: &IdentityClaims,
    ) -> Result<LocalUser, IdentityError> {
        self.users
            .find_by_username(&claims.preferred_username)
            .await?
            .ok_or_else(|| IdentityError::UserNotFound(claims.preferred_username.clone()))
    }
}
