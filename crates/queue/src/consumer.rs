//! Broker session traits and message types.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Header carrying how many times a message has been republished after a
/// transient failure.
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// Header set on messages routed to a dead-letter queue.
pub const DEATH_REASON_HEADER: &str = "x-death-reason";

/// Application headers the pipeline reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeaders {
    pub retry_count: u32,
    pub death_reason: Option<String>,
}

impl MessageHeaders {
    /// Headers for the next redelivery attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            retry_count: self.retry_count.saturating_add(1),
            death_reason: None,
        }
    }

    /// Headers for a message being parked in the dead-letter queue.
    pub fn dead_letter(&self, reason: impl Into<String>) -> Self {
        Self {
            retry_count: self.retry_count,
            death_reason: Some(reason.into()),
        }
    }
}

/// A raw message delivered by the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Message identifier (AMQP `message_id`, or the delivery tag when unset).
    pub id: String,
    /// Raw message body, expected to be JSON.
    pub body: Vec<u8>,
    /// Channel-scoped handle used to ack/nack this delivery.
    pub delivery_tag: u64,
    /// When the message was published, or when it was received if unknown.
    pub timestamp: DateTime<Utc>,
    /// Broker flag: this delivery was handed out before and not acked.
    pub redelivered: bool,
    pub headers: MessageHeaders,
}

impl fmt::Display for QueueMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QueueMessage {{ id: {}, tag: {}, bytes: {}, retries: {} }}",
            self.id,
            self.delivery_tag,
            self.body.len(),
            self.headers.retry_count
        )
    }
}

/// Something that can open sessions against a message broker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open a connection and a channel.
    ///
    /// Fails with [`QueueError::Connection`] when the broker cannot be reached;
    /// callers retry those with backoff.
    async fn connect(&self) -> Result<Box<dyn BrokerSession>, QueueError>;

    /// Provider name for logs (e.g. "amqp", "memory").
    fn provider(&self) -> &str;
}

/// An open channel on a broker connection.
///
/// A session is owned by exactly one consumer; deliveries are pulled one at a
/// time and acknowledged manually.
#[async_trait]
pub trait BrokerSession: Send {
    /// Declare a queue that survives broker restarts.
    async fn declare_durable(&mut self, queue: &str) -> Result<(), QueueError>;

    /// Bound the number of unacknowledged deliveries in flight.
    async fn set_prefetch(&mut self, prefetch: u16) -> Result<(), QueueError>;

    /// Start consuming `queue` in manual-ack mode.
    async fn start_consuming(&mut self, queue: &str, consumer_tag: &str) -> Result<(), QueueError>;

    /// Next delivery, or `None` once the stream is closed.
    async fn next_message(&mut self) -> Option<Result<QueueMessage, QueueError>>;

    /// Acknowledge a delivery. The broker forgets the message.
    async fn ack(&self, delivery_tag: u64) -> Result<(), QueueError>;

    /// Negative-acknowledge a delivery, optionally asking the broker to requeue it.
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), QueueError>;

    /// Publish a persistent JSON message to `queue` on the default exchange.
    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        headers: &MessageHeaders,
    ) -> Result<(), QueueError>;

    /// Close the channel and connection.
    async fn close(&mut self) -> Result<(), QueueError>;
}
