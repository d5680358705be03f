//! The shared key-value store backing every storage service.
//!
//! One [`SharedStore`] plays the role an external key-value server does in
//! a multi-process deployment: lists for queues, string entries with
//! optional expiry for the cache, and named channels for pub/sub. All
//! services hold clones of the same store, and `SharedStore::global()`
//! hands out the lazily-created process-wide instance so independently
//! constructed services still observe each other's writes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;

static GLOBAL: OnceLock<SharedStore> = OnceLock::new();

#[derive(Default)]
struct ListSlot {
    items: VecDeque<String>,
    notify: Arc<Notify>,
}

struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

#[derive(Default)]
struct Inner {
    lists: Mutex<HashMap<String, ListSlot>>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    channels: Mutex<HashMap<String, Vec<oneshot::Sender<String>>>>,
}

/// In-process key-value store with list, string, and channel primitives.
///
/// Cloning is cheap and every clone refers to the same data. The locks are
/// never held across an await point; blocking pops wait on a per-list
/// [`Notify`] whose stored permit closes the push/wait race.
#[derive(Clone, Default)]
pub struct SharedStore {
    inner: Arc<Inner>,
}

impl SharedStore {
    /// A fresh store sharing nothing with any other instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide store. Created lazily on first use; idempotent.
    pub fn global() -> SharedStore {
        GLOBAL.get_or_init(SharedStore::new).clone()
    }

    // ------------------------------------------------------------------
    // Lists (queues)
    // ------------------------------------------------------------------

    /// Left-push a value onto the named list and wake one blocked popper.
    pub fn list_push_front(&self, key: &str, value: String) {
        let mut lists = self.inner.lists.lock().expect("store lock poisoned");
        let slot = lists.entry(key.to_owned()).or_default();
        slot.items.push_front(value);
        slot.notify.notify_one();
    }

    /// Non-blocking right-pop; `None` when the list is empty.
    pub fn list_pop_back(&self, key: &str) -> Option<String> {
        let mut lists = self.inner.lists.lock().expect("store lock poisoned");
        lists.get_mut(key).and_then(|slot| slot.items.pop_back())
    }

    /// Blocking right-pop.
    ///
    /// `timeout` semantics match a blocking-pop command on an external
    /// store: `Some(0)` returns immediately, `Some(d)` waits up to `d`,
    /// `None` waits until a value is pushed.
    pub async fn list_pop_back_blocking(
        &self,
        key: &str,
        timeout: Option<Duration>,
    ) -> Option<String> {
        match timeout {
            Some(d) if d.is_zero() => self.list_pop_back(key),
            Some(d) => tokio::time::timeout(d, self.wait_pop(key)).await.ok(),
            None => Some(self.wait_pop(key).await),
        }
    }

    pub fn list_len(&self, key: &str) -> usize {
        let lists = self.inner.lists.lock().expect("store lock poisoned");
        lists.get(key).map(|slot| slot.items.len()).unwrap_or(0)
    }

    async fn wait_pop(&self, key: &str) -> String {
        loop {
            let notify = {
                let mut lists = self.inner.lists.lock().expect("store lock poisoned");
                let slot = lists.entry(key.to_owned()).or_default();
                if let Some(value) = slot.items.pop_back() {
                    return value;
                }
                slot.notify.clone()
            };
            // A push between the unlock above and this await leaves a
            // stored permit, so the wakeup cannot be lost.
            notify.notified().await;
        }
    }

    // ------------------------------------------------------------------
    // String entries (cache)
    // ------------------------------------------------------------------

    pub fn entry_set(&self, key: &str, value: String, ttl: Option<Duration>) {
        let mut entries = self.inner.entries.lock().expect("store lock poisoned");
        entries.insert(
            key.to_owned(),
            CacheEntry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
    }

    pub fn entry_get(&self, key: &str) -> Option<String> {
        let mut entries = self.inner.entries.lock().expect("store lock poisoned");
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub fn entry_delete(&self, key: &str) {
        let mut entries = self.inner.entries.lock().expect("store lock poisoned");
        entries.remove(key);
    }

    pub fn entry_exists(&self, key: &str) -> bool {
        self.entry_get(key).is_some()
    }

    // ------------------------------------------------------------------
    // Channels (pub/sub)
    // ------------------------------------------------------------------

    /// Register a one-shot subscriber on the named channel.
    pub fn channel_subscribe(&self, channel: &str) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        let mut channels = self.inner.channels.lock().expect("store lock poisoned");
        channels.entry(channel.to_owned()).or_default().push(tx);
        rx
    }

    /// Deliver `value` to every current subscriber of the channel.
    ///
    /// Best-effort: with no subscriber the message is dropped, and a
    /// subscriber that went away is skipped. Returns the delivery count.
    pub fn channel_publish(&self, channel: &str, value: &str) -> usize {
        let subscribers = {
            let mut channels = self.inner.channels.lock().expect("store lock poisoned");
            channels.remove(channel).unwrap_or_default()
        };
        let mut delivered = 0;
        for tx in subscribers {
            if tx.send(value.to_owned()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_then_pop_is_fifo() {
        let store = SharedStore::new();
        store.list_push_front("q", "a".into());
        store.list_push_front("q", "b".into());
        store.list_push_front("q", "c".into());

        assert_eq!(store.list_pop_back("q").as_deref(), Some("a"));
        assert_eq!(store.list_pop_back("q").as_deref(), Some("b"));
        assert_eq!(store.list_pop_back("q").as_deref(), Some("c"));
        assert_eq!(store.list_pop_back("q"), None);
    }

    #[tokio::test]
    async fn blocking_pop_wakes_on_push() {
        let store = SharedStore::new();
        let waiter = store.clone();
        let handle =
            tokio::spawn(async move { waiter.list_pop_back_blocking("q", None).await });

        // Give the waiter a chance to park before pushing.
        tokio::task::yield_now().await;
        store.list_push_front("q", "hello".into());

        let popped = handle.await.expect("waiter panicked");
        assert_eq!(popped.as_deref(), Some("hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_pop_times_out_on_empty_list() {
        let store = SharedStore::new();
        let popped = store
            .list_pop_back_blocking("q", Some(Duration::from_secs(2)))
            .await;
        assert_eq!(popped, None);
    }

    #[tokio::test]
    async fn zero_timeout_returns_immediately() {
        let store = SharedStore::new();
        assert_eq!(
            store.list_pop_back_blocking("q", Some(Duration::ZERO)).await,
            None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = SharedStore::new();
        store.entry_set("k", "v".into(), Some(Duration::from_secs(60)));
        assert!(store.entry_exists("k"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.entry_get("k"), None);
        assert!(!store.entry_exists("k"));
    }

    #[tokio::test]
    async fn publish_without_subscriber_is_dropped() {
        let store = SharedStore::new();
        assert_eq!(store.channel_publish("hook", "{}"), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_published_message() {
        let store = SharedStore::new();
        let rx = store.channel_subscribe("hook");
        assert_eq!(store.channel_publish("hook", "payload"), 1);
        assert_eq!(rx.await.as_deref(), Ok("payload"));
    }
}
