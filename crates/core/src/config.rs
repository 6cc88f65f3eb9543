use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Upper bound on any per-call timeout applied to external services.
pub const MAX_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Where settings are read from. The process environment in production,
/// a map in tests.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads from `std::env`.
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Profile-aware reader: tries `{PROFILE}_{KEY}` first, falls back to `{KEY}`.
struct Profiled<'a> {
    source: &'a dyn EnvSource,
    profile: &'a str,
}

impl Profiled<'_> {
    fn opt(&self, key: &str) -> Option<String> {
        if !self.profile.is_empty() {
            let prefixed = format!("{}_{}", self.profile, key);
            if let Some(v) = self.source.get(&prefixed).filter(|s| !s.is_empty()) {
                return Some(v);
            }
        }
        self.source.get(key).filter(|s| !s.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.opt(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value: raw }),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.opt(key)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub broker: BrokerConfig,
    pub consumer: ConsumerConfig,
    pub mail: MailConfig,
    pub identity: IdentityApiConfig,
    pub store: StoreConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `COMPROBANTE_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&ProcessEnv)
    }

    pub fn from_source(source: &dyn EnvSource) -> Result<Self, ConfigError> {
        let profile = source
            .get("COMPROBANTE_PROFILE")
            .unwrap_or_default()
            .to_uppercase();
        let p = Profiled {
            source,
            profile: &profile,
        };

        let config = Self {
            profile: profile.clone(),
            broker: BrokerConfig::read(&p)?,
            consumer: ConsumerConfig::read(&p)?,
            mail: MailConfig::read(&p)?,
            identity: IdentityApiConfig::read(&p)?,
            store: StoreConfig::read(&p),
        };
        config.validate()?;
        Ok(config)
    }

    /// Broker settings alone, for producers that need no mail or API access.
    pub fn broker_from_env() -> Result<BrokerConfig, ConfigError> {
        Self::broker_from_source(&ProcessEnv)
    }

    pub fn broker_from_source(source: &dyn EnvSource) -> Result<BrokerConfig, ConfigError> {
        let profile = source
            .get("COMPROBANTE_PROFILE")
            .unwrap_or_default()
            .to_uppercase();
        BrokerConfig::read(&Profiled {
            source,
            profile: &profile,
        })
    }

    /// Reject configurations the consumers cannot start with. Missing mail
    /// credentials or API token is a startup error, never a per-message one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mail.username.is_none() {
            return Err(ConfigError::Missing("MAIL_USERNAME"));
        }
        if self.mail.password.is_none() {
            return Err(ConfigError::Missing("MAIL_PASSWORD"));
        }
        if self.identity.token.is_none() {
            return Err(ConfigError::Missing("SUNAT_TOKEN"));
        }
        if self.consumer.connect_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "CONNECT_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }
        // A zero timeout would fail every call before it starts.
        if self.mail.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "MAIL_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }
        if self.identity.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "IDENTITY_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  broker:    {}:{} vhost={}", self.broker.host, self.broker.port, self.broker.vhost);
        tracing::info!(
            "  consumer:  prefetch={}, connect_attempts={}, backoff={}s, max_redeliveries={}",
            self.consumer.prefetch,
            self.consumer.connect_max_attempts,
            self.consumer.connect_backoff_secs,
            self.consumer.max_redeliveries
        );
        tracing::info!(
            "  mail:      {}:{} tls={} user={}",
            self.mail.server,
            self.mail.port,
            self.mail.use_tls,
            self.mail.username.as_deref().unwrap_or("(none)")
        );
        tracing::info!(
            "  identity:  url={} timeout={}s token={}",
            self.identity.base_url,
            self.identity.timeout_secs,
            if self.identity.token.is_some() { "set" } else { "(none)" }
        );
        tracing::info!(
            "  store:     {}",
            if self.store.database_url.is_some() { "postgres" } else { "memory" }
        );
    }
}

// ── Broker (RabbitMQ) ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    pub heartbeat_secs: u16,
}

impl BrokerConfig {
    fn read(p: &Profiled<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            host: p.or("RABBITMQ_HOST", "localhost"),
            port: p.parsed("RABBITMQ_PORT", 5672)?,
            username: p.or("RABBITMQ_USER", "guest"),
            password: p.or("RABBITMQ_PASSWORD", "guest"),
            vhost: p.or("RABBITMQ_VHOST", "/"),
            heartbeat_secs: p.parsed("RABBITMQ_HEARTBEAT_SECS", 300)?,
        })
    }

    /// AMQP URI for the broker. Credentials and vhost are percent-encoded,
    /// so the default vhost `/` becomes `%2F`.
    pub fn amqp_uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}?heartbeat={}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            urlencoding::encode(&self.vhost),
            self.heartbeat_secs
        )
    }
}

// ── Consumer ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    pub prefetch: u16,
    pub connect_max_attempts: u32,
    pub connect_backoff_secs: u64,
    pub max_redeliveries: u32,
}

impl ConsumerConfig {
    /// Prefetch is bounded to the range the pipeline was sized for.
    pub const PREFETCH_RANGE: (u16, u16) = (1, 10);

    fn read(p: &Profiled<'_>) -> Result<Self, ConfigError> {
        let prefetch: u16 = p.parsed("CONSUMER_PREFETCH", 10)?;
        Ok(Self {
            prefetch: prefetch.clamp(Self::PREFETCH_RANGE.0, Self::PREFETCH_RANGE.1),
            connect_max_attempts: p.parsed("CONNECT_MAX_ATTEMPTS", 10)?,
            connect_backoff_secs: p.parsed("CONNECT_BACKOFF_SECS", 3)?,
            max_redeliveries: p.parsed("MAX_REDELIVERIES", 3)?,
        })
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_secs(self.connect_backoff_secs)
    }

    /// Override the prefetch bound (e.g. from the command line), clamped.
    pub fn set_prefetch(&mut self, prefetch: u16) {
        self.prefetch = prefetch.clamp(Self::PREFETCH_RANGE.0, Self::PREFETCH_RANGE.1);
    }
}

// ── Mail (SMTP) ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub server: String,
    pub port: u16,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub use_tls: bool,
    pub timeout_secs: u64,
}

impl MailConfig {
    fn read(p: &Profiled<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            server: p.or("MAIL_SERVER", "smtp.gmail.com"),
            port: p.parsed("MAIL_PORT", 587)?,
            username: p.opt("MAIL_USERNAME"),
            password: p.opt("MAIL_PASSWORD"),
            use_tls: p.flag("MAIL_USE_TLS", true),
            timeout_secs: p.parsed("MAIL_TIMEOUT_SECS", 10)?,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs).min(MAX_CALL_TIMEOUT)
    }
}

// ── Identity API (DNI / RUC) ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityApiConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl IdentityApiConfig {
    fn read(p: &Profiled<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: p.or("IDENTITY_API_URL", "https://apiperu.dev"),
            token: p.opt("SUNAT_TOKEN"),
            timeout_secs: p.parsed("IDENTITY_TIMEOUT_SECS", 6)?,
        })
    }

    /// Lookup timeout, never above [`MAX_CALL_TIMEOUT`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs).min(MAX_CALL_TIMEOUT)
    }
}

// ── Store ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(skip_serializing)]
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl StoreConfig {
    fn read(p: &Profiled<'_>) -> Self {
        Self {
            database_url: p.opt("DATABASE_URL"),
            max_connections: p
                .opt("PG_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        }
    }
}
