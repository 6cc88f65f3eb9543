use thiserror::Error;

use comprobante_queue::QueueError;
use comprobante_store::StoreError;

/// Failures inside the per-message pipeline that warrant redelivery.
///
/// Validation, enrichment and email problems are not errors here; they are
/// absorbed into the [`crate::pipeline::Outcome`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("store append failed: {0}")]
    Store(#[from] StoreError),
}

/// Reasons a consumer stops. Every variant ends the process with a failure
/// status so a supervisor restarts it.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("broker unreachable after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("channel setup failed: {0}")]
    Setup(#[source] QueueError),

    #[error("delivery stream for {queue} closed")]
    StreamClosed { queue: String },

    #[error("channel error: {0}")]
    Channel(#[from] QueueError),
}
