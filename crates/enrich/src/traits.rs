//! Lookup trait and client construction errors.

use comprobante_core::{DocumentKind, Enrichment};

/// Errors building a lookup client. Lookups themselves never error.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Resolves an identity number into registry data.
#[async_trait::async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Look up `number` in the registry for `kind`.
    ///
    /// Implementations capture every failure into [`Enrichment::Failure`].
    async fn lookup(&self, kind: DocumentKind, number: &str) -> Enrichment;
}
