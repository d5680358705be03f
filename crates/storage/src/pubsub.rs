//! Webhook pub/sub channels.
//!
//! A subscriber blocks until a publisher sends on the channel; a publish
//! with no subscriber is dropped. Each subscription is tied to one caller
//! and receives at most one message.

use serde_json::Value;
use tracing::debug;

use crate::error::StoreError;
use crate::memory::SharedStore;

#[derive(Clone)]
pub struct WebhookPubSub {
    store: SharedStore,
}

impl WebhookPubSub {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Fire-and-forget publish. Returns how many subscribers received it.
    pub fn publish(&self, channel: &str, message: &Value) -> Result<usize, StoreError> {
        let serialized = serde_json::to_string(message)?;
        let delivered = self.store.channel_publish(channel, &serialized);
        debug!(channel, delivered, "published webhook message");
        Ok(delivered)
    }

    /// Block until a message is published on the channel.
    pub async fn subscribe(&self, channel: &str) -> Result<Value, StoreError> {
        let rx = self.store.channel_subscribe(channel);
        let serialized = rx
            .await
            .map_err(|_| StoreError::ChannelClosed(channel.to_owned()))?;
        Ok(serde_json::from_str(&serialized)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscriber_blocks_until_publish() {
        let pubsub = WebhookPubSub::new(SharedStore::new());
        let sub = pubsub.clone();
        let handle = tokio::spawn(async move { sub.subscribe("hook-1").await });

        tokio::task::yield_now().await;
        let delivered = pubsub.publish("hook-1", &json!({ "body": 1 })).unwrap();
        assert_eq!(delivered, 1);

        let received = handle.await.unwrap().unwrap();
        assert_eq!(received, json!({ "body": 1 }));
    }

    #[tokio::test]
    async fn publish_without_subscriber_is_best_effort() {
        let pubsub = WebhookPubSub::new(SharedStore::new());
        assert_eq!(pubsub.publish("nobody", &json!(1)).unwrap(), 0);
    }
}
