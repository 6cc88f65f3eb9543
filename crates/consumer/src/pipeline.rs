//! Per-message processing: validate, enrich, store, notify.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use comprobante_core::{DocumentKind, ProcessedDocument};
use comprobante_enrich::IdentityLookup;
use comprobante_notify::{receipt_notification, Notifier, ReceiptRenderer};
use comprobante_store::DocumentRepository;

use crate::dispatch::{validate, Dispatch, RejectReason};
use crate::error::PipelineError;

/// What happened to the notification for a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notified {
    Sent,
    /// No `email_destino` on the message.
    Skipped,
    /// Rendering or delivery failed, or the notifier panicked; logged only.
    Failed,
}

/// Result of a message that did not need redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Rejected(RejectReason),
    Stored {
        id: Uuid,
        enriched: bool,
        notified: Notified,
    },
}

/// Processing steps shared by every consumer of one document kind.
pub struct Pipeline {
    kind: DocumentKind,
    lookup: Arc<dyn IdentityLookup>,
    notifier: Arc<dyn Notifier>,
    renderer: Arc<ReceiptRenderer>,
    repository: Arc<dyn DocumentRepository>,
}

impl Pipeline {
    pub fn new(
        kind: DocumentKind,
        lookup: Arc<dyn IdentityLookup>,
        notifier: Arc<dyn Notifier>,
        renderer: Arc<ReceiptRenderer>,
        repository: Arc<dyn DocumentRepository>,
    ) -> Self {
        Self {
            kind,
            lookup,
            notifier,
            renderer,
            repository,
        }
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// Run one delivery body through the pipeline.
    ///
    /// Only a failed store append is an error: the document has not been
    /// kept anywhere and the caller must arrange redelivery. Email is sent
    /// after the append, so a redelivered message never double-notifies for
    /// a store failure. Once the append succeeds nothing below may cause
    /// redelivery, so a panicking notifier is contained here as well.
    pub async fn process(&self, raw: &[u8]) -> Result<Outcome, PipelineError> {
        let kind = self.kind;
        let (identity, mut payload) = match validate(raw, kind) {
            Dispatch::Accepted { identity, payload, .. } => (identity, payload),
            Dispatch::Rejected { reason } => {
                info!(%kind, %reason, "message rejected, dropping");
                return Ok(Outcome::Rejected(reason));
            }
        };

        let enrichment = self.lookup.lookup(kind, &identity).await;
        let enriched = enrichment.is_success();
        if !enriched {
            warn!(%kind, identity = %identity, ?enrichment, "enrichment failed, storing with error marker");
        }
        payload.merge_enrichment(kind, &enrichment);

        let recipient = payload.get_text("email_destino");
        let doc = ProcessedDocument::new(kind, identity.as_str(), payload);
        self.repository.append(&doc).await?;
        debug!(%kind, id = %doc.id, backend = self.repository.backend(), "document stored");

        let notified = match recipient {
            Some(to) => self.notify(&doc, &to).await,
            None => {
                debug!(%kind, id = %doc.id, "no email_destino, notification skipped");
                Notified::Skipped
            }
        };

        let compra_id = doc.purchase_id().unwrap_or_else(|| "-".to_string());
        info!(
            %kind,
            id = %doc.id,
            compra_id = %compra_id,
            enriched,
            ?notified,
            "document processed"
        );

        Ok(Outcome::Stored {
            id: doc.id,
            enriched,
            notified,
        })
    }

    async fn notify(&self, doc: &ProcessedDocument, to: &str) -> Notified {
        let kind = self.kind;
        let notification = match receipt_notification(&self.renderer, kind, &doc.fields, &doc.identity, to) {
            Ok(n) => n,
            Err(e) => {
                warn!(%kind, id = %doc.id, error = %e, "could not compose notification");
                return Notified::Failed;
            }
        };

        let delivery = AssertUnwindSafe(self.notifier.send(&notification)).catch_unwind();
        match delivery.await {
            Ok(Ok(())) => Notified::Sent,
            Ok(Err(e)) => {
                warn!(
                    %kind,
                    id = %doc.id,
                    channel = self.notifier.channel_name(),
                    to = %to,
                    error = %e,
                    "notification failed"
                );
                Notified::Failed
            }
            Err(panic) => {
                error!(
                    %kind,
                    id = %doc.id,
                    channel = self.notifier.channel_name(),
                    panic = %crate::consumer::panic_message(panic.as_ref()),
                    "notifier panicked after the document was stored"
                );
                Notified::Failed
            }
        }
    }
}
