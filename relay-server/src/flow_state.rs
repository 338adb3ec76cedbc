//! TTL cache of `state` values for in-flight authorization-code flows.

use std::time::Duration;

use log::warn;
use moka::future::Cache;

const FLOW_STATE_CAPACITY: u64 = 10_000;

/// Pending `state` values issued at flow initiation.
///
/// Entries expire after the configured TTL and are single-use: `take`
/// removes the value on retrieval, so a replayed callback cannot reuse it.
#[derive(Clone)]
pub struct FlowStateStore {
    cache: Cache<String, ()>,
}

impl FlowStateStore {
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(FLOW_STATE_CAPACITY)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    /// Record a freshly issued state value
    pub async fn insert(&self, state: String) {
        self.cache.insert(state, ()).await;
        self.cache.run_pending_tasks().await;
        let size = self.cache.entry_count();
        if size >= FLOW_STATE_CAPACITY {
            warn!("flow state store reached capacity ({size}/{FLOW_STATE_CAPACITY})");
        }
    }

    /// Consume a state value. Returns false if it was never issued, already
    /// used, or has expired.
    pub async fn take(&self, state: &str) -> bool {
        self.cache.remove(state).await.is_some()
    }

    /// Check for a pending state value without consuming it
    #[cfg(test)]
    pub async fn contains(&self, state: &str) -> bool {
        self.cache.get(state).await.is_some()
    }
}
