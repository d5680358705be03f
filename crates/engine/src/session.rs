//! In-memory node-instance session store for stateful dev-mode runs.
//!
//! Entries are keyed by `(session_id, node_id)` so repeated single-node
//! executions from the same editing session reuse one live instance
//! (keeping iterator cursors, counters, and other node state). Entries
//! idle longer than the TTL are dropped lazily on the next access.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nodes::WorkflowNode;
use tokio::time::Instant;
use tracing::debug;

const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

struct SessionEntry {
    node: Arc<dyn WorkflowNode>,
    last_access: Instant,
}

pub struct NodeSessionStore {
    idle_ttl: Duration,
    entries: Mutex<HashMap<(String, String), SessionEntry>>,
}

impl NodeSessionStore {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_IDLE_TTL)
    }

    pub fn with_ttl(idle_ttl: Duration) -> Self {
        Self {
            idle_ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn sweep(&self, entries: &mut HashMap<(String, String), SessionEntry>) {
        let now = Instant::now();
        entries.retain(|key, entry| {
            let keep = now.duration_since(entry.last_access) < self.idle_ttl;
            if !keep {
                debug!(session_id = %key.0, node_id = %key.1, "evicting idle session node");
            }
            keep
        });
    }

    /// Fetch a live instance, refreshing its idle timer.
    pub fn get(&self, session_id: &str, node_id: &str) -> Option<Arc<dyn WorkflowNode>> {
        let mut entries = self.entries.lock().expect("session store lock poisoned");
        self.sweep(&mut entries);
        let entry = entries.get_mut(&(session_id.to_owned(), node_id.to_owned()))?;
        entry.last_access = Instant::now();
        Some(entry.node.clone())
    }

    pub fn insert(&self, session_id: &str, node_id: &str, node: Arc<dyn WorkflowNode>) {
        let mut entries = self.entries.lock().expect("session store lock poisoned");
        self.sweep(&mut entries);
        entries.insert(
            (session_id.to_owned(), node_id.to_owned()),
            SessionEntry {
                node,
                last_access: Instant::now(),
            },
        );
    }

    pub fn remove(&self, session_id: &str, node_id: &str) {
        let mut entries = self.entries.lock().expect("session store lock poisoned");
        entries.remove(&(session_id.to_owned(), node_id.to_owned()));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("session store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NodeSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodes::mock::MockNode;
    use nodes::NodeKind;
    use serde_json::json;

    #[tokio::test]
    async fn get_returns_the_inserted_instance() {
        let store = NodeSessionStore::new();
        let node = MockNode::returning("n1", NodeKind::Blocking, json!({}));
        store.insert("sess", "n1", node.clone());

        let fetched = store.get("sess", "n1").expect("entry should exist");
        assert_eq!(fetched.base().id(), "n1");
        assert!(store.get("other", "n1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_entries_are_evicted_lazily() {
        let store = NodeSessionStore::with_ttl(Duration::from_secs(60));
        store.insert("sess", "n1", MockNode::returning("n1", NodeKind::Blocking, json!({})));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(store.get("sess", "n1").is_some());

        // The access above refreshed the timer; idle past the TTL now.
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(store.get("sess", "n1").is_none());
        assert!(store.is_empty());
    }
}
