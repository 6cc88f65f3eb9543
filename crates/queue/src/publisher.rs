//! Producer side: publishing purchase-completed events.

use tracing::info;

use comprobante_core::PurchaseEvent;

use crate::consumer::{BrokerSession, MessageHeaders};
use crate::error::QueueError;

/// Publish a purchase event to the durable queue matching its document kind.
///
/// The queue is declared first so the message is not dropped when the
/// consumer has never run.
pub async fn publish_purchase(
    session: &mut dyn BrokerSession,
    event: &PurchaseEvent,
) -> Result<(), QueueError> {
    let queue = event.queue_name();
    session.declare_durable(queue).await?;

    let body = serde_json::to_vec(event)?;
    session.publish(queue, &body, &MessageHeaders::default()).await?;

    info!(
        queue,
        compra_id = event.compra_id,
        kind = %event.tipo_comprobante,
        "purchase event published"
    );
    Ok(())
}
