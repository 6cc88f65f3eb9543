pub mod amqp;
pub mod consumer;
pub mod error;
pub mod memory;
pub mod publisher;

pub use amqp::AmqpBroker;
pub use consumer::{Broker, BrokerSession, MessageHeaders, QueueMessage};
pub use error::QueueError;
pub use memory::MemoryBroker;
pub use publisher::publish_purchase;
