//! Process-lifetime repository. Contents are lost on restart and are not
//! shared between consumer processes.

use async_trait::async_trait;
use tokio::sync::RwLock;

use comprobante_core::ProcessedDocument;

use crate::error::StoreError;
use crate::repository::DocumentRepository;

#[derive(Debug, Default)]
pub struct MemoryRepository {
    docs: RwLock<Vec<ProcessedDocument>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRepository for MemoryRepository {
    async fn append(&self, doc: &ProcessedDocument) -> Result<(), StoreError> {
        self.docs.write().await.push(doc.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ProcessedDocument>, StoreError> {
        Ok(self.docs.read().await.clone())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.docs.read().await.len() as u64)
    }

    fn backend(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comprobante_core::{DocumentKind, DocumentMessage};
    use serde_json::json;

    fn doc(compra_id: i64) -> ProcessedDocument {
        let fields = match json!({"compra_id": compra_id, "tipo_comprobante": "boleta"}) {
            serde_json::Value::Object(map) => DocumentMessage::new(map),
            _ => unreachable!(),
        };
        ProcessedDocument::new(DocumentKind::Boleta, "72257140", fields)
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let repo = MemoryRepository::new();
        repo.append(&doc(1)).await.unwrap();
        repo.append(&doc(2)).await.unwrap();

        let listed = repo.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].purchase_id().as_deref(), Some("1"));
        assert_eq!(listed[1].purchase_id().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_duplicates_are_kept() {
        let repo = MemoryRepository::new();
        let d = doc(7);
        repo.append(&d).await.unwrap();
        repo.append(&doc(7)).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);
    }
}
