//! SMTP email notifier via `lettre` with TLS support.
//!
//! The transport is built from config at startup but only connects on the
//! first send. Concurrent first senders wait on a single initialisation; later
//! sends reuse the pooled connection. A failed initialisation is retried on the
//! next send.

use std::time::Duration;

use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tokio::sync::OnceCell;

use comprobante_core::config::MailConfig;

use crate::traits::{Notification, Notifier, NotifyError};

/// Port that speaks TLS from the first byte instead of upgrading with STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// Sends notifications as emails via SMTP.
#[derive(Debug)]
pub struct EmailNotifier {
    host: String,
    port: u16,
    use_tls: bool,
    credentials: Credentials,
    timeout: Duration,
    /// Sender mailbox (the SMTP username).
    from: Mailbox,
    transport: OnceCell<AsyncSmtpTransport<Tokio1Executor>>,
}

impl EmailNotifier {
    /// Build an `EmailNotifier` from SMTP configuration.
    ///
    /// Credentials are mandatory; their absence is reported here, at startup,
    /// rather than on every message. The username doubles as the From address.
    pub fn from_config(config: &MailConfig) -> Result<Self, NotifyError> {
        let (username, password) = match (&config.username, &config.password) {
            (Some(u), Some(p)) => (u.clone(), p.clone()),
            _ => {
                return Err(NotifyError::Config(
                    "MAIL_USERNAME and MAIL_PASSWORD are required".to_string(),
                ))
            }
        };

        let from: Mailbox = username
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        Ok(Self {
            host: config.server.clone(),
            port: config.port,
            use_tls: config.use_tls,
            credentials: Credentials::new(username, password),
            timeout: config.timeout(),
            from,
            transport: OnceCell::new(),
        })
    }

    /// Whether the SMTP session has been established.
    pub fn is_connected(&self) -> bool {
        self.transport.initialized()
    }

    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotifyError> {
        let builder = if self.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
        } else if self.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host)
        };

        // No socket timeout in lettre: every call is bounded by `self.timeout`
        // in `transport` and `send`, which report `NotifyError::Timeout`.
        Ok(builder
            .port(self.port)
            .credentials(self.credentials.clone())
            .timeout(None)
            .build())
    }

    async fn transport(&self) -> Result<&AsyncSmtpTransport<Tokio1Executor>, NotifyError> {
        self.transport
            .get_or_try_init(|| async {
                let transport = self.build_transport()?;
                let reachable = tokio::time::timeout(self.timeout, transport.test_connection())
                    .await
                    .map_err(|_| NotifyError::Timeout(self.timeout.as_secs()))?
                    .map_err(|e| NotifyError::Smtp(e.to_string()))?;
                if !reachable {
                    return Err(NotifyError::Smtp(format!(
                        "{}:{} did not accept the session",
                        self.host, self.port
                    )));
                }
                tracing::info!(host = %self.host, port = self.port, tls = self.use_tls, "SMTP session established");
                Ok::<_, NotifyError>(transport)
            })
            .await
    }

    fn build_message(&self, notification: &Notification) -> Result<Message, NotifyError> {
        let to: Mailbox = notification
            .to
            .parse()
            .map_err(|e: lettre::address::AddressError| {
                NotifyError::Address(format!("{}: {e}", notification.to))
            })?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&notification.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|e| NotifyError::Smtp(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    /// Send a notification email to its recipient.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let email = self.build_message(notification)?;
        let transport = self.transport().await?;

        tokio::time::timeout(self.timeout, transport.send(email))
            .await
            .map_err(|_| NotifyError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(
            channel = "email",
            subject = %notification.subject,
            to = %notification.to,
            "notification delivered"
        );

        Ok(())
    }

    /// Returns `"email"`.
    fn channel_name(&self) -> &str {
        "email"
    }
}
