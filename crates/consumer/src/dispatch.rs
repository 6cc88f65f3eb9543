//! Message validation: decides whether a raw delivery enters the pipeline.

use std::fmt;

use serde_json::Value;
use tracing::warn;

use comprobante_core::{DocumentKind, DocumentMessage};

/// Why a delivery was dropped without processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Body is not JSON, or not a JSON object.
    NotStructured,
    /// `tipo_comprobante` is absent, unknown, or belongs to the other consumer.
    WrongKind,
    /// The identity field (`dni` / `ruc`) is absent, empty, or not scalar.
    MissingIdentity,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::NotStructured => "not structured data",
            RejectReason::WrongKind => "wrong document type",
            RejectReason::MissingIdentity => "missing identity field",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Accepted {
        kind: DocumentKind,
        identity: String,
        payload: DocumentMessage,
    },
    Rejected {
        reason: RejectReason,
    },
}

impl Dispatch {
    fn rejected(reason: RejectReason) -> Self {
        Dispatch::Rejected { reason }
    }
}

/// Validate a raw delivery for the consumer of `expected`.
///
/// Pure apart from logging. A malformed identity number is forwarded with a
/// warning; only its absence rejects.
pub fn validate(raw: &[u8], expected: DocumentKind) -> Dispatch {
    let fields = match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => return Dispatch::rejected(RejectReason::NotStructured),
    };
    let payload = DocumentMessage::new(fields);

    // Exact, case-sensitive match on the wire tag.
    let matches_kind = matches!(
        payload.get("tipo_comprobante"),
        Some(Value::String(tag)) if tag == expected.tag()
    );
    if !matches_kind {
        return Dispatch::rejected(RejectReason::WrongKind);
    }

    let identity = match payload.get_text(expected.identity_field()) {
        Some(id) => id,
        None => return Dispatch::rejected(RejectReason::MissingIdentity),
    };

    if !expected.is_valid_identity(&identity) {
        warn!(
            kind = %expected,
            field = expected.identity_field(),
            identity = %identity,
            expected_digits = expected.identity_len(),
            "identity number is malformed, forwarding anyway"
        );
    }

    Dispatch::Accepted {
        kind: expected,
        identity,
        payload,
    }
}
