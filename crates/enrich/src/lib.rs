//! Identity lookups (DNI for persons, RUC for businesses).
//!
//! Lookups never fail past this crate: every outcome, including timeouts and
//! non-200 responses, resolves to an [`Enrichment`].

pub mod client;
pub mod traits;

pub use client::HttpIdentityClient;
pub use comprobante_core::Enrichment;
pub use traits::{EnrichError, IdentityLookup};
