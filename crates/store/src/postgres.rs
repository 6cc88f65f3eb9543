//! PostgreSQL-backed repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use comprobante_core::{DocumentKind, DocumentMessage, ProcessedDocument};

use crate::error::StoreError;
use crate::repository::DocumentRepository;

#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Connect and apply pending migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await?;
        info!("PostgreSQL connected");

        sqlx::migrate!("../../migrations").run(&pool).await?;
        info!("Database migrations applied successfully");

        Ok(Self { pool })
    }
}

#[async_trait]
impl DocumentRepository for PgRepository {
    async fn append(&self, doc: &ProcessedDocument) -> Result<(), StoreError> {
        let fields = serde_json::to_string(&doc.fields)?;
        sqlx::query(
            "INSERT INTO processed_documents (id, kind, identity, compra_id, received_at, fields) \
             VALUES ($1, $2, $3, $4, $5, $6::json)",
        )
        .bind(doc.id)
        .bind(doc.kind.tag())
        .bind(&doc.identity)
        .bind(doc.purchase_id())
        .bind(doc.received_at)
        .bind(fields)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ProcessedDocument>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, kind, identity, received_at, fields::text AS fields \
             FROM processed_documents ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<ProcessedDocument, StoreError> {
                let kind: String = row.try_get("kind")?;
                let kind: DocumentKind = kind
                    .parse()
                    .map_err(|e: comprobante_core::KindError| StoreError::InvalidRow(e.to_string()))?;
                let fields: String = row.try_get("fields")?;
                let fields: DocumentMessage = serde_json::from_str(&fields)?;
                Ok(ProcessedDocument {
                    id: row.try_get::<Uuid, _>("id")?,
                    kind,
                    identity: row.try_get("identity")?,
                    received_at: row.try_get::<DateTime<Utc>, _>("received_at")?,
                    fields,
                })
            })
            .collect()
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processed_documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    fn backend(&self) -> &str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Runs only when `TEST_DATABASE_URL` points at a disposable database.
    #[tokio::test]
    async fn test_append_and_list_roundtrip() {
        let url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => return,
        };
        let repo = PgRepository::connect(&url, 2).await.unwrap();
        let before = repo.count().await.unwrap();

        let fields = match json!({"tipo_comprobante": "factura", "ruc": "20123456789", "compra_id": 9}) {
            serde_json::Value::Object(map) => DocumentMessage::new(map),
            _ => unreachable!(),
        };
        let doc = ProcessedDocument::new(DocumentKind::Factura, "20123456789", fields);
        repo.append(&doc).await.unwrap();
        repo.append(&doc).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), before + 2);
        let listed = repo.list().await.unwrap();
        let last = listed.last().unwrap();
        assert_eq!(last.id, doc.id);
        assert_eq!(last.fields, doc.fields);
    }
}
