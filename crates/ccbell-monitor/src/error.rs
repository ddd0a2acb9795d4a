//! Error types for ccbell-monitor

use thiserror::Error;

/// Result type alias using ccbell-monitor's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for monitoring operations
#[derive(Error, Debug)]
pub enum Error {
    /// A collector could not produce a snapshot (tool missing, timed out, unparsable)
    #[error("Collection failed for '{domain}': {reason}")]
    CollectionFailed { domain: String, reason: String },

    /// An alert sink could not deliver an event
    #[error("Dispatch failed via {sink}: {reason}")]
    DispatchFailed { sink: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Start was requested for a monitor that is not stopped
    #[error("Monitor '{0}' is already running")]
    AlreadyRunning(String),

    /// No monitor registered under this domain
    #[error("Unknown monitor: {0}")]
    UnknownMonitor(String),

    /// A monitor is already registered under this domain
    #[error("Monitor already registered: {0}")]
    DuplicateMonitor(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a collection error
    pub fn collection(domain: impl Into<String>, reason: impl ToString) -> Self {
        Self::CollectionFailed {
            domain: domain.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a dispatch error
    pub fn dispatch(sink: impl Into<String>, reason: impl ToString) -> Self {
        Self::DispatchFailed {
            sink: sink.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Prefix a config error with the monitor it belongs to
    pub fn for_monitor(self, domain: &str) -> Self {
        match self {
            Self::Config(msg) => Self::Config(format!("monitor '{domain}': {msg}")),
            other => other,
        }
    }

    /// Whether this error came from the collection boundary
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::CollectionFailed { .. })
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
