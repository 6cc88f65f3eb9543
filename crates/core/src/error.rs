use thiserror::Error;

/// Startup configuration problems. Raised once, before any message is consumed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Problems with a document kind tag.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum KindError {
    #[error("unknown document kind: {0}")]
    Unknown(String),
}
