//! Repositories for processed documents.
//!
//! Documents are append-only. Redelivered messages produce duplicate entries;
//! nothing here deduplicates by purchase id.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use error::StoreError;
pub use memory::MemoryRepository;
pub use postgres::PgRepository;
pub use repository::{connect_repository, DocumentRepository};
