use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::kind::DocumentKind;

/// Unique identifier assigned to each stored document.
pub type DocId = Uuid;

/// A decoded queue message: a flat JSON object whose fields are passed
/// through untouched, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentMessage {
    fields: Map<String, Value>,
}

impl DocumentMessage {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String view of a field. Numbers are rendered; empty strings and
    /// everything else count as absent.
    pub fn get_text(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Merge an enrichment outcome: either every `data` field, or the kind's
    /// error marker. Exactly one of the two ends up in the message.
    pub fn merge_enrichment(&mut self, kind: DocumentKind, enrichment: &Enrichment) {
        match enrichment {
            Enrichment::Success { data } => {
                for (k, v) in data {
                    self.fields.insert(k.clone(), v.clone());
                }
            }
            Enrichment::Failure { error } => {
                self.fields
                    .insert(kind.error_marker().to_string(), Value::String(error.clone()));
            }
        }
    }

    /// One `key: value` pair per field, strings unquoted.
    pub fn field_lines(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => s.clone(),
                    Value::Null => "None".to_string(),
                    other => other.to_string(),
                };
                (k.clone(), rendered)
            })
            .collect()
    }
}

impl From<Map<String, Value>> for DocumentMessage {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

/// Outcome of an identity lookup. Lookups never fail past this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Enrichment {
    Success { data: Map<String, Value> },
    Failure { error: String },
}

impl Enrichment {
    pub fn failure(error: impl Into<String>) -> Self {
        Enrichment::Failure { error: error.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Enrichment::Success { .. })
    }
}

/// A message after enrichment, as kept by the document repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub id: DocId,
    pub kind: DocumentKind,
    pub identity: String,
    pub received_at: DateTime<Utc>,
    pub fields: DocumentMessage,
}

impl ProcessedDocument {
    pub fn new(kind: DocumentKind, identity: impl Into<String>, fields: DocumentMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            identity: identity.into(),
            received_at: Utc::now(),
            fields,
        }
    }

    /// `compra_id` of the originating purchase, if the producer sent one.
    pub fn purchase_id(&self) -> Option<String> {
        self.fields.get_text("compra_id")
    }
}

/// Message published by the storefront when a purchase completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseEvent {
    pub compra_id: i64,
    pub tipo_comprobante: DocumentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_destino: Option<String>,
    pub total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dni: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ruc: Option<String>,
}

impl PurchaseEvent {
    /// Build an event carrying `identity` in the field its kind expects.
    pub fn new(
        compra_id: i64,
        kind: DocumentKind,
        identity: impl Into<String>,
        email_destino: Option<String>,
        total: f64,
    ) -> Self {
        let identity = identity.into();
        let (dni, ruc) = match kind {
            DocumentKind::Boleta => (Some(identity), None),
            DocumentKind::Factura => (None, Some(identity)),
        };
        Self {
            compra_id,
            tipo_comprobante: kind,
            email_destino,
            total,
            dni,
            ruc,
        }
    }

    /// Queue the event must be published to.
    pub fn queue_name(&self) -> &'static str {
        self.tipo_comprobante.queue_name()
    }
}
