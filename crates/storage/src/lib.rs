//! `storage` crate — queue, cache, and webhook pub/sub services over a
//! shared in-process key-value store.
//!
//! The engine and the built-in nodes only ever talk to [`DataStore`], a
//! facade that hands out the specialised services:
//!
//! - [`QueueStore`] — blocking FIFO lists (push / pop / length)
//! - [`CacheStore`] — keyed JSON values with optional TTL
//! - [`WebhookPubSub`] — named channels with one-shot blocking receive
//!
//! All values cross the store boundary as JSON, so payloads survive a
//! round-trip through a queue exactly as they would through an external
//! key-value server.

pub mod cache;
pub mod data_store;
pub mod error;
pub mod memory;
pub mod pubsub;
pub mod queue;

pub use cache::CacheStore;
pub use data_store::DataStore;
pub use error::StoreError;
pub use memory::SharedStore;
pub use pubsub::WebhookPubSub;
pub use queue::QueueStore;
