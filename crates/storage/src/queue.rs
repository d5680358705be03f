//! Queue operations over the shared store's list primitive.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::StoreError;
use crate::memory::SharedStore;

/// FIFO queues keyed by logical queue name.
///
/// Values are JSON-serialized on push and deserialized on pop. Multiple
/// pushers and poppers may share a queue; each message is handed to
/// exactly one popper.
#[derive(Clone)]
pub struct QueueStore {
    store: SharedStore,
    prefix: String,
}

impl QueueStore {
    pub fn new(store: SharedStore, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn queue_key(&self, queue_name: &str) -> String {
        format!("{}queue:{queue_name}", self.prefix)
    }

    /// Left-push a value onto the named queue.
    pub fn push(&self, queue_name: &str, value: &Value) -> Result<(), StoreError> {
        let queue_key = self.queue_key(queue_name);
        let serialized = serde_json::to_string(value)?;
        self.store.list_push_front(&queue_key, serialized);
        debug!(%queue_key, "pushed to queue");
        Ok(())
    }

    /// Blocking right-pop.
    ///
    /// `timeout` of `Some(0)` polls once, `Some(d)` waits up to `d`, and
    /// `None` blocks until a value arrives. Returns `Ok(None)` when the
    /// wait expired without a value.
    pub async fn pop(
        &self,
        queue_name: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Value>, StoreError> {
        let queue_key = self.queue_key(queue_name);
        match self.store.list_pop_back_blocking(&queue_key, timeout).await {
            Some(serialized) => {
                debug!(%queue_key, "popped from queue");
                Ok(Some(serde_json::from_str(&serialized)?))
            }
            None => Ok(None),
        }
    }

    pub fn length(&self, queue_name: &str) -> usize {
        self.store.list_len(&self.queue_key(queue_name))
    }
}
