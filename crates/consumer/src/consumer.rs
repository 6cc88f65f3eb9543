//! Document consumer: connection lifecycle and acknowledgment policy.
//!
//! One consumer owns one broker session and processes deliveries strictly one
//! at a time. Setup retries only connection-level failures; once consuming,
//! any loss of the delivery stream ends the consumer.
//!
//! Acknowledgment:
//! - rejected or fully processed messages are acked;
//! - a store failure, or a panic before the document is stored, republishes
//!   the message with `x-retry-count` incremented and acks the original,
//!   until the count reaches the redelivery limit, after which the message
//!   goes to `{queue}.dlq` with `x-death-reason`;
//! - if that republish fails the delivery is nacked with requeue.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use comprobante_core::config::ConsumerConfig;
use comprobante_core::DocumentKind;
use comprobante_queue::{Broker, BrokerSession, QueueMessage};

use crate::error::ConsumerError;
use crate::pipeline::{Outcome, Pipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    Consuming,
    Processing,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsumerState::Disconnected => "disconnected",
            ConsumerState::Connecting => "connecting",
            ConsumerState::Consuming => "consuming",
            ConsumerState::Processing => "processing",
        };
        f.write_str(s)
    }
}

/// How a delivery was settled with the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Acked,
    /// Republished for another attempt; `attempt` is the new retry count.
    Retried { attempt: u32 },
    DeadLettered,
    /// Republish failed; the broker keeps the original.
    Requeued,
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub kind: DocumentKind,
    pub prefetch: u16,
    pub connect_max_attempts: u32,
    pub connect_backoff: Duration,
    pub max_redeliveries: u32,
}

impl ConsumerSettings {
    pub fn from_config(kind: DocumentKind, config: &ConsumerConfig) -> Self {
        Self {
            kind,
            prefetch: config.prefetch,
            connect_max_attempts: config.connect_max_attempts,
            connect_backoff: config.connect_backoff(),
            max_redeliveries: config.max_redeliveries,
        }
    }

    pub fn queue(&self) -> &'static str {
        self.kind.queue_name()
    }
}

pub struct DocumentConsumer {
    settings: ConsumerSettings,
    broker: Arc<dyn Broker>,
    pipeline: Arc<Pipeline>,
    consumer_tag: String,
    state: ConsumerState,
    processed: u64,
}

impl DocumentConsumer {
    pub fn new(settings: ConsumerSettings, broker: Arc<dyn Broker>, pipeline: Arc<Pipeline>) -> Self {
        let consumer_tag = format!("comprobante-{}-{}", settings.kind, std::process::id());
        Self {
            settings,
            broker,
            pipeline,
            consumer_tag,
            state: ConsumerState::Disconnected,
            processed: 0,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Deliveries settled since start.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    fn transition(&mut self, next: ConsumerState) {
        if self.state != next {
            debug!(kind = %self.settings.kind, from = %self.state, to = %next, "consumer state");
            self.state = next;
        }
    }

    /// Connect, set up the channel and consume until the stream ends.
    ///
    /// Never returns `Ok`: a consumer runs until it fails, and the caller
    /// exits with an error so the process is restarted.
    pub async fn run(&mut self) -> Result<(), ConsumerError> {
        let mut session = self.connect().await?;

        let result = match self.setup(session.as_mut()).await {
            Ok(()) => {
                self.transition(ConsumerState::Consuming);
                info!(
                    kind = %self.settings.kind,
                    queue = self.settings.queue(),
                    prefetch = self.settings.prefetch,
                    "waiting for messages"
                );
                self.consume(session.as_mut()).await
            }
            Err(e) => Err(e),
        };

        self.transition(ConsumerState::Disconnected);
        if let Err(e) = session.close().await {
            debug!(kind = %self.settings.kind, error = %e, "session close failed");
        }
        result
    }

    async fn connect(&mut self) -> Result<Box<dyn BrokerSession>, ConsumerError> {
        let kind = self.settings.kind;
        let max = self.settings.connect_max_attempts.max(1);
        let mut last = String::new();

        for attempt in 1..=max {
            self.transition(ConsumerState::Connecting);
            match self.broker.connect().await {
                Ok(session) => {
                    info!(%kind, provider = self.broker.provider(), attempt, "connected to broker");
                    return Ok(session);
                }
                Err(e) if e.is_connection() => {
                    warn!(%kind, attempt, max, error = %e, "broker not reachable");
                    last = e.to_string();
                    self.transition(ConsumerState::Disconnected);
                    if attempt < max {
                        tokio::time::sleep(self.settings.connect_backoff).await;
                    }
                }
                Err(e) => {
                    self.transition(ConsumerState::Disconnected);
                    error!(%kind, error = %e, "broker connection failed");
                    return Err(ConsumerError::Setup(e));
                }
            }
        }

        error!(%kind, attempts = max, "giving up on broker connection");
        Err(ConsumerError::RetriesExhausted { attempts: max, last })
    }

    async fn setup(&self, session: &mut dyn BrokerSession) -> Result<(), ConsumerError> {
        let queue = self.settings.queue();
        session
            .declare_durable(queue)
            .await
            .map_err(ConsumerError::Setup)?;
        session
            .declare_durable(&self.settings.kind.dead_letter_queue())
            .await
            .map_err(ConsumerError::Setup)?;
        session
            .set_prefetch(self.settings.prefetch)
            .await
            .map_err(ConsumerError::Setup)?;
        session
            .start_consuming(queue, &self.consumer_tag)
            .await
            .map_err(ConsumerError::Setup)?;
        Ok(())
    }

    async fn consume(&mut self, session: &mut dyn BrokerSession) -> Result<(), ConsumerError> {
        let kind = self.settings.kind;
        let queue = self.settings.queue();

        loop {
            let message = match session.next_message().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    error!(%kind, error = %e, "delivery stream failed");
                    return Err(ConsumerError::Channel(e));
                }
                None => {
                    warn!(%kind, queue, processed = self.processed, "delivery stream closed");
                    return Err(ConsumerError::StreamClosed {
                        queue: queue.to_string(),
                    });
                }
            };

            self.transition(ConsumerState::Processing);
            debug!(%kind, %message, redelivered = message.redelivered, "received");
            let disposition = self.handle(session, &message).await?;
            self.processed += 1;
            debug!(%kind, tag = message.delivery_tag, ?disposition, "settled");
            self.transition(ConsumerState::Consuming);
        }
    }

    /// Process one delivery and settle it with the broker.
    pub async fn handle(
        &self,
        session: &mut dyn BrokerSession,
        message: &QueueMessage,
    ) -> Result<Disposition, ConsumerError> {
        let kind = self.settings.kind;
        let processing = AssertUnwindSafe(self.pipeline.process(&message.body)).catch_unwind();

        let failure = match processing.await {
            Ok(Ok(outcome)) => {
                if let Outcome::Rejected(reason) = outcome {
                    debug!(%kind, tag = message.delivery_tag, %reason, "acking rejected message");
                }
                session.ack(message.delivery_tag).await?;
                return Ok(Disposition::Acked);
            }
            Ok(Err(e)) => {
                warn!(%kind, tag = message.delivery_tag, error = %e, "transient processing failure");
                e.to_string()
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(%kind, tag = message.delivery_tag, panic = %reason, "processing panicked");
                format!("processing panicked: {reason}")
            }
        };

        self.redeliver(session, message, failure).await
    }

    async fn redeliver(
        &self,
        session: &mut dyn BrokerSession,
        message: &QueueMessage,
        reason: String,
    ) -> Result<Disposition, ConsumerError> {
        let kind = self.settings.kind;
        let retries = message.headers.retry_count;

        let (target, headers, disposition) = if retries < self.settings.max_redeliveries {
            let headers = message.headers.next_attempt();
            let attempt = headers.retry_count;
            (self.settings.queue().to_string(), headers, Disposition::Retried { attempt })
        } else {
            (
                self.settings.kind.dead_letter_queue(),
                message.headers.dead_letter(reason.as_str()),
                Disposition::DeadLettered,
            )
        };

        match session.publish(&target, &message.body, &headers).await {
            Ok(()) => {
                session.ack(message.delivery_tag).await?;
                match &disposition {
                    Disposition::DeadLettered => error!(
                        %kind,
                        tag = message.delivery_tag,
                        retries,
                        queue = %target,
                        reason = %reason,
                        "redelivery limit reached, dead-lettered"
                    ),
                    _ => warn!(
                        %kind,
                        tag = message.delivery_tag,
                        attempt = headers.retry_count,
                        max = self.settings.max_redeliveries,
                        "message republished for retry"
                    ),
                }
                Ok(disposition)
            }
            Err(e) => {
                error!(%kind, tag = message.delivery_tag, queue = %target, error = %e, "republish failed, requeueing");
                session.nack(message.delivery_tag, true).await?;
                Ok(Disposition::Requeued)
            }
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config() {
        let config = ConsumerConfig {
            prefetch: 4,
            connect_max_attempts: 10,
            connect_backoff_secs: 3,
            max_redeliveries: 2,
        };
        let settings = ConsumerSettings::from_config(DocumentKind::Factura, &config);
        assert_eq!(settings.queue(), "cola_facturas");
        assert_eq!(settings.connect_backoff, Duration::from_secs(3));
        assert_eq!(settings.prefetch, 4);
    }

    #[test]
    fn panic_payloads_are_readable() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn state_display() {
        assert_eq!(ConsumerState::Processing.to_string(), "processing");
    }
}
