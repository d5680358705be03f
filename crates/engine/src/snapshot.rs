//! Cross-process projection of the execution state.
//!
//! On every tracker transition the engine pings a background writer task,
//! which serializes the tracker's full state into the cache under
//! `workflow_execution:{workflowId}` with a TTL. Observers in other
//! processes render from this snapshot; the in-memory tracker stays
//! authoritative.

use std::sync::Arc;
use std::time::Duration;

use storage::CacheStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::ExecutionStateTracker;

pub const STATE_KEY_PREFIX: &str = "workflow_execution:";
pub const STATE_TTL: Duration = Duration::from_secs(3600);

pub fn state_cache_key(workflow_id: &str) -> String {
    format!("{STATE_KEY_PREFIX}{workflow_id}")
}

/// Spawn the snapshot writer. Send `()` on the returned channel after
/// each state transition; the task coalesces pings into cache writes and
/// exits when every sender is dropped.
pub fn spawn_snapshot_writer(
    workflow_id: String,
    tracker: Arc<ExecutionStateTracker>,
    cache: CacheStore,
) -> (mpsc::UnboundedSender<()>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    let handle = tokio::spawn(async move {
        let key = state_cache_key(&workflow_id);
        while rx.recv().await.is_some() {
            // Drain queued pings; one write covers them all.
            while rx.try_recv().is_ok() {}

            match serde_json::to_value(tracker.full_state()) {
                Ok(state) => {
                    if let Err(error) = cache.set(&key, &state, Some(STATE_TTL)) {
                        warn!(%key, error = %error, "failed to write state snapshot");
                    } else {
                        debug!(%key, "state snapshot written");
                    }
                }
                Err(error) => warn!(error = %error, "failed to serialize state snapshot"),
            }
        }
    });
    (tx, handle)
}

/// Read another process's snapshot (or this one's) from the cache.
pub fn read_snapshot(
    cache: &CacheStore,
    workflow_id: &str,
) -> Result<Option<serde_json::Value>, storage::StoreError> {
    cache.get(&state_cache_key(workflow_id))
}
