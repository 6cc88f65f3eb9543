//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    /// Broker unreachable. The only error worth retrying with backoff.
    #[error("connection error: {0}")]
    Connection(String),

    #[error("queue declare failed for {queue}: {reason}")]
    Declare { queue: String, reason: String },

    #[error("acknowledge error: {0}")]
    Ack(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("channel is not consuming")]
    NotConsuming,

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("provider error: {0}")]
    Provider(String),
}

impl QueueError {
    /// Connection-level failures are retried; everything else is fatal at setup.
    pub fn is_connection(&self) -> bool {
        matches!(self, QueueError::Connection(_))
    }
}
