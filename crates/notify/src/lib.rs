//! Email notifications for issued documents.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable delivery
//! - SMTP email notifier with a lazily established, reused transport
//! - Minijinja rendering of the document summary sent to customers

pub mod email;
pub mod templating;
pub mod traits;

pub use email::EmailNotifier;
pub use templating::{receipt_notification, ReceiptRenderer};
pub use traits::{Notification, Notifier, NotifyError};
