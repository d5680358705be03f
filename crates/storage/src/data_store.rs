//! `DataStore` — facade over the storage services.
//!
//! Nodes and the engine construct a `DataStore` wherever they need
//! storage; `DataStore::shared()` binds to the process-wide store, so a
//! queue writer and a queue reader built independently still meet on the
//! same queues. Construction is lazy and idempotent.

use tracing::debug;

use crate::cache::CacheStore;
use crate::memory::SharedStore;
use crate::pubsub::WebhookPubSub;
use crate::queue::QueueStore;

const KEY_PREFIX: &str = "datastore:";

#[derive(Clone)]
pub struct DataStore {
    queue: QueueStore,
    cache: CacheStore,
    webhooks: WebhookPubSub,
}

impl DataStore {
    /// A store bound to the process-wide shared backend.
    pub fn shared() -> Self {
        Self::with_backend(SharedStore::global())
    }

    /// A store with a private backend, isolated from every other instance.
    pub fn isolated() -> Self {
        Self::with_backend(SharedStore::new())
    }

    pub fn with_backend(store: SharedStore) -> Self {
        debug!("data store initialized");
        Self {
            queue: QueueStore::new(store.clone(), KEY_PREFIX),
            cache: CacheStore::new(store.clone(), KEY_PREFIX),
            webhooks: WebhookPubSub::new(store),
        }
    }

    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn webhooks(&self) -> &WebhookPubSub {
        &self.webhooks
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::shared()
    }
}
