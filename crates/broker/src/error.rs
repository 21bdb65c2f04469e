use thiserror::Error;

/// Errors that can occur when publishing or consuming messages.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The payload could not be serialized or a message could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker refused the message.
    #[error("Publish to '{topic}' failed: {reason}")]
    Transport { topic: String, reason: String },

    /// The background publish queue is full.
    #[error("Publish queue is full")]
    QueueFull,

    /// The background publish queue has shut down.
    #[error("Publish queue is closed")]
    QueueClosed,
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
