//! Notifier trait definition and shared error types.

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("SMTP delivery timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// A rendered notification ready for delivery to one recipient.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Notification {
    /// Recipient address.
    pub to: String,
    /// The rendered subject line.
    pub subject: String,
    /// Plaintext body.
    pub body: String,
}

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification through this channel.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g., "email").
    fn channel_name(&self) -> &str;
}
