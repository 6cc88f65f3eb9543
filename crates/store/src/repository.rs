use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use comprobante_core::config::StoreConfig;
use comprobante_core::ProcessedDocument;

use crate::error::StoreError;
use crate::memory::MemoryRepository;
use crate::postgres::PgRepository;

/// Append-only storage for processed documents.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Append a document. Never replaces an existing entry.
    async fn append(&self, doc: &ProcessedDocument) -> Result<(), StoreError>;

    /// All documents in append order.
    async fn list(&self) -> Result<Vec<ProcessedDocument>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    /// Backend name for logs.
    fn backend(&self) -> &str;
}

/// PostgreSQL when `DATABASE_URL` is configured, otherwise process memory.
pub async fn connect_repository(
    config: &StoreConfig,
) -> Result<Arc<dyn DocumentRepository>, StoreError> {
    match &config.database_url {
        Some(url) => {
            let repo = PgRepository::connect(url, config.max_connections).await?;
            Ok(Arc::new(repo))
        }
        None => {
            info!("DATABASE_URL not set, processed documents kept in memory only");
            Ok(Arc::new(MemoryRepository::new()))
        }
    }
}
