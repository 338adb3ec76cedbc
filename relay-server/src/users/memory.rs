use async_trait::async_trait;
use dashmap::DashMap;

use super::{LocalUser, UserStore, UserStoreError};

/// In-memory user repository backed by a concurrent map.
///
/// The map's entry API provides the atomic get-or-create the [`UserStore`]
/// contract requires; no guard is held across an await point.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: DashMap<String, LocalUser>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<LocalUser>, UserStoreError> {
        Ok(self.users.get(username).map(|entry| entry.value().clone()))
    }

    async fn create_if_absent(
        &self,
        username: &str,
        email: &str,
    ) -> Result<LocalUser, UserStoreError> {
        let entry = self
            .users
            .entry(username.to_string())
            .or_insert_with(|| LocalUser {
                username: username.to_string(),
                email: email.to_string(),
            });
        Ok(entry.value().clone())
    }
}
