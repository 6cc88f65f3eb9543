//! Minijinja rendering of the document summary emailed to customers.
//!
//! The body lists every field of the final merged document, one `key: value`
//! line each, in the order the fields arrived.

use serde::Serialize;

use comprobante_core::{DocumentKind, DocumentMessage};

use crate::traits::{Notification, NotifyError};

const SUBJECT_TEMPLATE: &str = "{{ label }} {{ number }}";

const BODY_TEMPLATE: &str = "Detalle de la {{ kind }}:\n\n\
{% for f in fields %}{{ f.key }}: {{ f.value }}{% if not loop.last %}\n{% endif %}{% endfor %}";

/// Context data available to receipt templates.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptContext {
    /// Wire tag, e.g. `"boleta"`.
    pub kind: String,
    /// Capitalised label, e.g. `"Boleta"`.
    pub label: String,
    /// Document number shown in the subject.
    pub number: String,
    pub fields: Vec<FieldLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldLine {
    pub key: String,
    pub value: String,
}

impl ReceiptContext {
    /// Build the context for a merged document.
    ///
    /// The subject number is the document's `numero` field when present, then
    /// its `compra_id`, then the identity number it was issued against.
    pub fn new(kind: DocumentKind, document: &DocumentMessage, identity: &str) -> Self {
        let number = document
            .get_text("numero")
            .or_else(|| document.get_text("compra_id"))
            .unwrap_or_else(|| identity.to_string());

        Self {
            kind: kind.tag().to_string(),
            label: kind.label().to_string(),
            number,
            fields: document
                .field_lines()
                .into_iter()
                .map(|(key, value)| FieldLine { key, value })
                .collect(),
        }
    }
}

/// Renders receipt subjects and bodies using minijinja.
#[derive(Debug)]
pub struct ReceiptRenderer {
    env: minijinja::Environment<'static>,
}

impl ReceiptRenderer {
    /// Create a renderer with the subject and body templates registered.
    pub fn new() -> Result<Self, NotifyError> {
        let mut env = minijinja::Environment::new();
        env.add_template("subject", SUBJECT_TEMPLATE)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        env.add_template("body", BODY_TEMPLATE)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: &ReceiptContext) -> Result<String, NotifyError> {
        self.env
            .get_template(name)
            .and_then(|t| t.render(ctx))
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    pub fn subject(&self, ctx: &ReceiptContext) -> Result<String, NotifyError> {
        self.render("subject", ctx)
    }

    pub fn body(&self, ctx: &ReceiptContext) -> Result<String, NotifyError> {
        self.render("body", ctx)
    }
}

/// Compose the email for a processed document.
pub fn receipt_notification(
    renderer: &ReceiptRenderer,
    kind: DocumentKind,
    document: &DocumentMessage,
    identity: &str,
    to: &str,
) -> Result<Notification, NotifyError> {
    let ctx = ReceiptContext::new(kind, document, identity);
    Ok(Notification {
        to: to.to_string(),
        subject: renderer.subject(&ctx)?,
        body: renderer.body(&ctx)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn document(value: Value) -> DocumentMessage {
        match value {
            Value::Object(map) => DocumentMessage::new(map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn body_lists_fields_in_order() {
        let renderer = ReceiptRenderer::new().unwrap();
        let doc = document(json!({
            "tipo_comprobante": "boleta",
            "dni": "72257140",
            "total": 150.5,
            "nombres": "ANA"
        }));

        let n = receipt_notification(&renderer, DocumentKind::Boleta, &doc, "72257140", "a@b.com")
            .unwrap();

        assert_eq!(
            n.body,
            "Detalle de la boleta:\n\ntipo_comprobante: boleta\ndni: 72257140\ntotal: 150.5\nnombres: ANA"
        );
        assert_eq!(n.to, "a@b.com");
    }

    #[test]
    fn subject_prefers_numero() {
        let renderer = ReceiptRenderer::new().unwrap();
        let doc = document(json!({"numero": "B001-42", "compra_id": 42}));
        let n = receipt_notification(&renderer, DocumentKind::Boleta, &doc, "72257140", "a@b.com")
            .unwrap();
        assert_eq!(n.subject, "Boleta B001-42");
    }

    #[test]
    fn subject_falls_back_to_purchase_then_identity() {
        let renderer = ReceiptRenderer::new().unwrap();

        let doc = document(json!({"compra_id": 42}));
        let n = receipt_notification(&renderer, DocumentKind::Factura, &doc, "20123456789", "x@y.pe")
            .unwrap();
        assert_eq!(n.subject, "Factura 42");

        let doc = document(json!({"ruc": "20123456789"}));
        let n = receipt_notification(&renderer, DocumentKind::Factura, &doc, "20123456789", "x@y.pe")
            .unwrap();
        assert_eq!(n.subject, "Factura 20123456789");
    }

    #[test]
    fn values_are_not_html_escaped() {
        let renderer = ReceiptRenderer::new().unwrap();
        let doc = document(json!({"razon_social": "A & B <SAC>"}));
        let n = receipt_notification(&renderer, DocumentKind::Factura, &doc, "20123456789", "x@y.pe")
            .unwrap();
        assert!(n.body.ends_with("razon_social: A & B <SAC>"));
    }

    #[test]
    fn empty_document_renders_header_only() {
        let renderer = ReceiptRenderer::new().unwrap();
        let doc = DocumentMessage::default();
        let n = receipt_notification(&renderer, DocumentKind::Boleta, &doc, "72257140", "a@b.com")
            .unwrap();
        assert_eq!(n.body, "Detalle de la boleta:\n\n");
    }
}
