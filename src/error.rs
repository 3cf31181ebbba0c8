//! Error types for the probe engine
//!
//! Only configuration and initialization failures abort a run. Transport and
//! classification failures are absorbed per probe, and report misuse fails
//! the offending call only.

use thiserror::Error;

use crate::probe::TransportErrorKind;

/// Top-level error for engine operations
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP transport could not be initialized
    #[error("Transport initialization failed: {0}")]
    TransportInit(String),

    /// Report errors
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Export serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration errors, always fatal before the first probe
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {path}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {field} - {reason}")]
    ValidationError { field: String, reason: String },

    #[error("Missing required configuration: {0}")]
    MissingField(String),

    #[error("Dimension '{0}' is empty")]
    EmptyDimension(String),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Module '{0}' has no section in the configuration file")]
    MissingSection(String),

    #[error("Failed to read wordlist {path}")]
    WordlistError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a single request attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(ms: u64) -> Self {
        Self::new(TransportErrorKind::Timeout, format!("no response after {}ms", ms))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            if error_chain_mentions(&err, "dns") || error_chain_mentions(&err, "resolve") {
                TransportErrorKind::Dns
            } else {
                TransportErrorKind::Connect
            }
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else {
            TransportErrorKind::Request
        };

        Self::new(kind, err.to_string())
    }
}

fn error_chain_mentions(err: &(dyn std::error::Error + 'static), needle: &str) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if e.to_string().to_lowercase().contains(needle) {
            return true;
        }
        current = e.source();
    }
    false
}

/// A rule could not evaluate a response; the rule is skipped for that result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("rule '{rule}' skipped: response body is not text")]
    NonTextBody { rule: String },

    #[error("rule '{rule}' skipped: response body exceeded the capture limit")]
    TruncatedBody { rule: String },

    #[error("rule '{rule}' could not parse body: {reason}")]
    MalformedBody { rule: String, reason: String },
}

/// Report errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("Report already finalized")]
    AlreadyFinalized,
}

impl ProbeError {
    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            ProbeError::Config(e) => format!("Configuration problem: {}", e.user_hint()),
            ProbeError::TransportInit(reason) => {
                format!("Could not set up the HTTP client: {}", reason)
            }
            ProbeError::Report(e) => format!("Report problem: {}", e),
            ProbeError::Io(e) => format!("File system issue: {}", e),
            ProbeError::Serialization(e) => format!("Export problem: {}", e),
        }
    }
}

/// Trait for providing user-friendly hints
pub trait UserHint {
    fn user_hint(&self) -> String;
}

impl UserHint for ConfigError {
    fn user_hint(&self) -> String {
        match self {
            ConfigError::ReadError { path, .. } => {
                format!("Could not read '{}'. Check if the file exists and you have read permissions.", path)
            }
            ConfigError::ParseError(_) => {
                "The configuration file has invalid syntax. Check for JSON or TOML formatting errors.".into()
            }
            ConfigError::EmptyDimension(name) => {
                format!("'{}' needs at least one value.", name)
            }
            ConfigError::UnknownModule(name) => {
                format!("'{}' is not a module. Use brute, fuzz or rate-limit.", name)
            }
            ConfigError::MissingSection(name) => {
                format!("Add a '{}' section to the configuration file. Run `nexus-probe init` for a sample.", name)
            }
            ConfigError::WordlistError { path, .. } => {
                format!("Wordlist '{}' could not be read.", path)
            }
            _ => self.to_string(),
        }
    }
}
