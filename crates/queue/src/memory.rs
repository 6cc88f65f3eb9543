//! In-process broker for local runs and tests.
//!
//! Queues are plain FIFO buffers shared by every session opened from the same
//! [`MemoryBroker`]. A consuming session's stream ends once its queue is empty,
//! which mirrors a broker dropping the connection.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::consumer::{Broker, BrokerSession, MessageHeaders, QueueMessage};
use crate::error::QueueError;

#[derive(Debug, Default)]
struct MemoryState {
    queues: HashMap<String, VecDeque<QueueMessage>>,
    declared: HashSet<String>,
    unacked: HashMap<u64, (String, QueueMessage)>,
    acked: Vec<u64>,
    nacked: Vec<(u64, bool)>,
    next_tag: u64,
    connect_attempts: u32,
    failing_connects: u32,
    fail_declare: bool,
    fail_publish: bool,
    prefetch: Option<u16>,
}

impl MemoryState {
    fn enqueue(&mut self, queue: &str, body: Vec<u8>, headers: MessageHeaders) -> u64 {
        self.next_tag += 1;
        let tag = self.next_tag;
        let msg = QueueMessage {
            id: format!("mem-{tag}"),
            body,
            delivery_tag: tag,
            timestamp: Utc::now(),
            redelivered: false,
            headers,
        };
        self.queues.entry(queue.to_string()).or_default().push_back(msg);
        tag
    }
}

/// Shared handle to an in-memory broker. Clones see the same queues.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a test panicked mid-operation; the data is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a message body, returning its delivery tag.
    pub fn push(&self, queue: &str, body: impl Into<Vec<u8>>) -> u64 {
        self.lock().enqueue(queue, body.into(), MessageHeaders::default())
    }

    /// Make the next `n` connection attempts fail at the connection level.
    pub fn fail_next_connects(&self, n: u32) {
        self.lock().failing_connects = n;
    }

    /// Make queue declaration fail (a non-connection setup error).
    pub fn fail_declare(&self, fail: bool) {
        self.lock().fail_declare = fail;
    }

    /// Make every publish fail, as an unconfirmed publish would.
    pub fn fail_publish(&self, fail: bool) {
        self.lock().fail_publish = fail;
    }

    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    /// Delivery tags acknowledged so far, in ack order.
    pub fn acked(&self) -> Vec<u64> {
        self.lock().acked.clone()
    }

    /// `(delivery_tag, requeue)` for every nack, in order.
    pub fn nacked(&self) -> Vec<(u64, bool)> {
        self.lock().nacked.clone()
    }

    /// Messages currently waiting in `queue`.
    pub fn messages(&self, queue: &str) -> Vec<QueueMessage> {
        self.lock()
            .queues
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn depth(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    pub fn is_declared(&self, queue: &str) -> bool {
        self.lock().declared.contains(queue)
    }

    pub fn prefetch(&self) -> Option<u16> {
        self.lock().prefetch
    }

    /// Deliveries handed out but neither acked nor nacked.
    pub fn unacked(&self) -> usize {
        self.lock().unacked.len()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(&self) -> Result<Box<dyn BrokerSession>, QueueError> {
        let mut state = self.lock();
        state.connect_attempts += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(QueueError::Connection("memory broker refused connection".into()));
        }
        drop(state);

        Ok(Box::new(MemorySession {
            broker: self.clone(),
            consuming: None,
        }))
    }

    fn provider(&self) -> &str {
        "memory"
    }
}

struct MemorySession {
    broker: MemoryBroker,
    consuming: Option<String>,
}

#[async_trait]
impl BrokerSession for MemorySession {
    async fn declare_durable(&mut self, queue: &str) -> Result<(), QueueError> {
        let mut state = self.broker.lock();
        if state.fail_declare {
            return Err(QueueError::Declare {
                queue: queue.to_string(),
                reason: "declare refused".into(),
            });
        }
        state.declared.insert(queue.to_string());
        state.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn set_prefetch(&mut self, prefetch: u16) -> Result<(), QueueError> {
        self.broker.lock().prefetch = Some(prefetch);
        Ok(())
    }

    async fn start_consuming(&mut self, queue: &str, _consumer_tag: &str) -> Result<(), QueueError> {
        if !self.broker.is_declared(queue) {
            return Err(QueueError::Provider(format!("queue {queue} not declared")));
        }
        self.consuming = Some(queue.to_string());
        Ok(())
    }

    async fn next_message(&mut self) -> Option<Result<QueueMessage, QueueError>> {
        let queue = match &self.consuming {
            Some(q) => q.clone(),
            None => return Some(Err(QueueError::NotConsuming)),
        };
        let mut state = self.broker.lock();
        let msg = state.queues.get_mut(&queue)?.pop_front()?;
        state
            .unacked
            .insert(msg.delivery_tag, (queue, msg.clone()));
        Some(Ok(msg))
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), QueueError> {
        let mut state = self.broker.lock();
        if state.unacked.remove(&delivery_tag).is_none() {
            return Err(QueueError::Ack(format!("unknown delivery tag {delivery_tag}")));
        }
        state.acked.push(delivery_tag);
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), QueueError> {
        let mut state = self.broker.lock();
        let (queue, mut msg) = state
            .unacked
            .remove(&delivery_tag)
            .ok_or_else(|| QueueError::Ack(format!("unknown delivery tag {delivery_tag}")))?;
        state.nacked.push((delivery_tag, requeue));
        if requeue {
            msg.redelivered = true;
            state.queues.entry(queue).or_default().push_front(msg);
        }
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        headers: &MessageHeaders,
    ) -> Result<(), QueueError> {
        let mut state = self.broker.lock();
        if state.fail_publish {
            return Err(QueueError::Publish(format!("broker rejected message for {queue}")));
        }
        state.enqueue(queue, body.to_vec(), headers.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), QueueError> {
        self.consuming = None;
        Ok(())
    }
}
