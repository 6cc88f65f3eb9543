//! Boleta and factura consumers.
//!
//! A consumer takes purchase-completed messages from its durable queue,
//! validates them, enriches them with identity-registry data, stores the
//! result and emails a summary to the customer. Both document kinds run the
//! same code, parameterised by [`comprobante_core::DocumentKind`].

pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod pipeline;

pub use consumer::{ConsumerSettings, ConsumerState, Disposition, DocumentConsumer};
pub use dispatch::{validate, Dispatch, RejectReason};
pub use error::{ConsumerError, PipelineError};
pub use pipeline::{Notified, Outcome, Pipeline};
