//! Typed error type for the storage crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The subscriber side of a pub/sub channel went away mid-receive.
    #[error("pub/sub channel '{0}' closed before a message arrived")]
    ChannelClosed(String),
}
