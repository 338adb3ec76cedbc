use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub mod memory;

/// Errors that can occur against the user repository
#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("user repository unavailable: {0}")]
    Backend(String),
}

/// A local identity record mirroring a provider-side account.
///
/// The username is the unique key and never changes once the record exists;
/// the email is captured from the token claims at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LocalUser {
    /// Unique username, mirrors the provider's `preferred_username` claim
    pub username: String,
    /// Email address, may be empty
    pub email: String,
}

/// Repository contract for local user records.
///
/// Implementations must be safe to call from concurrent requests and must
/// give `create_if_absent` atomic get-or-create semantics: concurrent calls
/// with the same username observe a single record.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by username
    async fn find_by_username(&self, username: &str) -> Result<Option<LocalUser>, UserStoreError>;

    /// Return the existing record for the username, or create one with the
    /// given email
    async fn create_if_absent(
        &self,
        username: &str,
        email: &str,
    ) -> Result<LocalUser, UserStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = UserStoreError::Backend("connection reset".to_string());
        assert_eq!(
            err.to_string(),
            "user repository unavailable: connection reset"
        );
    }
}
