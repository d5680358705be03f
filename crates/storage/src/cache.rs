//! Cache operations over the shared store's string entries.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::StoreError;
use crate::memory::SharedStore;

/// Keyed JSON values with optional TTL.
///
/// Writes are last-writer-wins. A missing TTL means the entry persists
/// until deleted.
#[derive(Clone)]
pub struct CacheStore {
    store: SharedStore,
    prefix: String,
}

impl CacheStore {
    pub fn new(store: SharedStore, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn cache_key(&self, key: &str) -> String {
        format!("{}cache:{key}", self.prefix)
    }

    pub fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(value)?;
        self.store.entry_set(&self.cache_key(key), serialized, ttl);
        debug!(key, "set cache key");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match self.store.entry_get(&self.cache_key(key)) {
            Some(serialized) => Ok(Some(serde_json::from_str(&serialized)?)),
            None => Ok(None),
        }
    }

    pub fn delete(&self, key: &str) {
        self.store.entry_delete(&self.cache_key(key));
        debug!(key, "deleted cache key");
    }

    pub fn exists(&self, key: &str) -> bool {
        self.store.entry_exists(&self.cache_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> CacheStore {
        CacheStore::new(SharedStore::new(), "datastore:")
    }

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let c = cache();
        c.set("k", &json!({ "data": 123 }), None).unwrap();
        assert_eq!(c.get("k").unwrap(), Some(json!({ "data": 123 })));
        assert!(c.exists("k"));

        c.delete("k");
        assert_eq!(c.get("k").unwrap(), None);
        assert!(!c.exists("k"));
    }

    #[tokio::test]
    async fn overwrite_is_last_writer_wins() {
        let c = cache();
        c.set("k", &json!(1), None).unwrap();
        c.set("k", &json!(2), None).unwrap();
        assert_eq!(c.get("k").unwrap(), Some(json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expires_entries() {
        let c = cache();
        c.set("k", &json!("v"), Some(Duration::from_secs(10))).unwrap();
        assert!(c.exists("k"));
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(c.get("k").unwrap(), None);
    }
}
