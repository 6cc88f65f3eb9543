//! Document kinds and the per-kind settings that differentiate consumers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KindError;

/// The two document types issued after a purchase.
///
/// Each kind carries everything that distinguishes its consumer: queue name,
/// identity field, enrichment endpoint and error marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Retail receipt, tied to a personal ID (DNI).
    Boleta,
    /// Business invoice, tied to a tax ID (RUC).
    Factura,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 2] = [DocumentKind::Boleta, DocumentKind::Factura];

    /// Value of `tipo_comprobante` on the wire.
    pub fn tag(self) -> &'static str {
        match self {
            DocumentKind::Boleta => "boleta",
            DocumentKind::Factura => "factura",
        }
    }

    /// Durable queue this kind is consumed from.
    pub fn queue_name(self) -> &'static str {
        match self {
            DocumentKind::Boleta => "cola_boletas",
            DocumentKind::Factura => "cola_facturas",
        }
    }

    /// Message field holding the identity number.
    pub fn identity_field(self) -> &'static str {
        match self {
            DocumentKind::Boleta => "dni",
            DocumentKind::Factura => "ruc",
        }
    }

    /// Expected digit count of the identity number.
    pub fn identity_len(self) -> usize {
        match self {
            DocumentKind::Boleta => 8,
            DocumentKind::Factura => 11,
        }
    }

    /// Path segment of the identity API (`/api/{endpoint}`).
    pub fn lookup_endpoint(self) -> &'static str {
        self.identity_field()
    }

    /// Key merged into the document when enrichment fails.
    pub fn error_marker(self) -> &'static str {
        match self {
            DocumentKind::Boleta => "dni_error",
            DocumentKind::Factura => "sunat_error",
        }
    }

    /// Failure text recorded when the identity API cannot be reached.
    pub fn unreachable_message(self) -> &'static str {
        match self {
            DocumentKind::Boleta => "Error de conexión con API DNI",
            DocumentKind::Factura => "Error de conexión con SUNAT",
        }
    }

    /// Capitalised label used in email subjects.
    pub fn label(self) -> &'static str {
        match self {
            DocumentKind::Boleta => "Boleta",
            DocumentKind::Factura => "Factura",
        }
    }

    /// Dead-letter queue paired with [`Self::queue_name`].
    pub fn dead_letter_queue(self) -> String {
        format!("{}.dlq", self.queue_name())
    }

    /// Whether `value` looks like a well-formed identity number for this kind.
    pub fn is_valid_identity(self, value: &str) -> bool {
        value.len() == self.identity_len() && value.bytes().all(|b| b.is_ascii_digit())
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for DocumentKind {
    type Err = KindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "boleta" => Ok(DocumentKind::Boleta),
            "factura" => Ok(DocumentKind::Factura),
            _ => Err(KindError::Unknown(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("Boleta".parse::<DocumentKind>(), Ok(DocumentKind::Boleta));
        assert_eq!(" FACTURA ".parse::<DocumentKind>(), Ok(DocumentKind::Factura));
    }

    #[test]
    fn parse_unknown_kind() {
        let err = "nota_credito".parse::<DocumentKind>().unwrap_err();
        assert_eq!(err, KindError::Unknown("nota_credito".to_string()));
    }

    #[test]
    fn per_kind_settings() {
        assert_eq!(DocumentKind::Boleta.queue_name(), "cola_boletas");
        assert_eq!(DocumentKind::Factura.queue_name(), "cola_facturas");
        assert_eq!(DocumentKind::Boleta.error_marker(), "dni_error");
        assert_eq!(DocumentKind::Factura.error_marker(), "sunat_error");
        assert_eq!(DocumentKind::Factura.dead_letter_queue(), "cola_facturas.dlq");
    }

    #[test]
    fn identity_shape() {
        assert!(DocumentKind::Boleta.is_valid_identity("72257140"));
        assert!(!DocumentKind::Boleta.is_valid_identity("7225714"));
        assert!(DocumentKind::Factura.is_valid_identity("20123456789"));
        assert!(!DocumentKind::Factura.is_valid_identity("2012345678A"));
    }

    #[test]
    fn serde_uses_wire_tag() {
        let json = serde_json::to_string(&DocumentKind::Factura).unwrap();
        assert_eq!(json, "\"factura\"");
    }
}
