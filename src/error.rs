//! Error types for node-sentinel

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Request routing errors
    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    /// Health probe errors
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Node store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Failure of a single call against one origin, as reported by the transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Server returned HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl CallError {
    /// Whether this failure says something about the node rather than the request.
    ///
    /// Timeouts, connection failures and gateway-class HTTP statuses count as
    /// network failures. Everything else is an answer from a reachable server.
    pub fn is_network(&self) -> bool {
        match self {
            CallError::Timeout | CallError::Connection(_) => true,
            CallError::Rejected { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            CallError::Malformed(_) => false,
        }
    }

    /// Build a rejection from an HTTP status and body text
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        CallError::Rejected {
            status,
            message: message.into(),
        }
    }
}

/// Health probe errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Node unreachable: {0}")]
    Network(String),

    #[error("Unparseable status response: {0}")]
    Parse(String),

    #[error("Node rejected status request: {0}")]
    Rejected(String),
}

impl From<CallError> for ProbeError {
    fn from(err: CallError) -> Self {
        if err.is_network() {
            return ProbeError::Network(err.to_string());
        }

        match err {
            CallError::Malformed(msg) => ProbeError::Parse(msg),
            other => ProbeError::Rejected(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ProbeError {
    fn from(err: serde_json::Error) -> Self {
        ProbeError::Parse(err.to_string())
    }
}

/// Errors surfaced by the failover wrapper
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("No endpoints available")]
    NoEndpointsAvailable,

    #[error("All {attempts} attempts failed, last error: {last}")]
    AllAttemptsExhausted { attempts: usize, last: CallError },

    #[error("{0}")]
    NonRetryable(CallError),
}

impl RequestError {
    /// Whether the caller should present this as a connectivity problem.
    ///
    /// `NonRetryable` errors carry the server's own message instead.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            RequestError::NoEndpointsAvailable | RequestError::AllAttemptsExhausted { .. }
        )
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid config file: {0}")]
    InvalidFile(String),

    #[error("Invalid node URL: {0}")]
    InvalidUrl(String),

    #[error("Unknown network group: {0}")]
    UnknownGroup(String),

    #[error("Invalid version requirement: {0}")]
    InvalidVersion(String),

    #[error("Config file parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Node store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read node list: {0}")]
    ReadError(String),

    #[error("Failed to write node list: {0}")]
    WriteError(String),

    #[error("Node list corrupted: {0}")]
    Corrupted(String),

    #[error("Node list version mismatch: expected at most {expected}, found {found}")]
    UnsupportedVersion { expected: u32, found: u32 },
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
