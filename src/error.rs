//! Error types
//!
//! Misuse of the persister (`PersistError`) is reported synchronously to the
//! caller. Store failures (`StoreError`) happen on the writer task and are
//! routed through the configured failure policy instead.

use std::io::Error as IoError;

/// Synchronous errors returned by `RowPersister::accept` and `close`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    /// Write attempted after the stream was ended or destroyed
    Closed,
    /// Write attempted on a stream that cannot take writes
    NotWritable,
    /// The record could not be encoded for the configured structure
    Encode(String),
}

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistError::Closed => write!(f, "RowPersister: write after end"),
            PersistError::NotWritable => write!(f, "RowPersister: not a writable stream"),
            PersistError::Encode(msg) => write!(f, "RowPersister: cannot encode record: {}", msg),
        }
    }
}

impl std::error::Error for PersistError {}

/// Errors from a key-value store backend
#[derive(Debug)]
pub enum StoreError {
    /// Connection or socket error
    Io(IoError),
    /// The server answered with an error reply (`-ERR ...`)
    Server(String),
    /// The reply could not be decoded or was not what the command expects
    Protocol(String),
    /// Operation against a key holding the wrong kind of value
    WrongType(String),
    /// Connection closed by the peer
    ConnectionClosed,
    /// Fault injected by `SimulatedStore`
    Injected(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "store I/O error: {}", e),
            StoreError::Server(msg) => write!(f, "store error reply: {}", msg),
            StoreError::Protocol(msg) => write!(f, "store protocol error: {}", msg),
            StoreError::WrongType(key) => write!(
                f,
                "WRONGTYPE Operation against a key holding the wrong kind of value: {}",
                key
            ),
            StoreError::ConnectionClosed => write!(f, "store connection closed"),
            StoreError::Injected(op) => write!(f, "injected fault during {}", op),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<IoError> for StoreError {
    fn from(e: IoError) -> Self {
        StoreError::Io(e)
    }
}

/// Errors while loading configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read
    Io(IoError),
    /// Config file is not valid TOML for `PersisterConfig`
    Toml(String),
    /// A value is present but invalid
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {}", e),
            ConfigError::Toml(msg) => write!(f, "config parse error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<IoError> for ConfigError {
    fn from(e: IoError) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Toml(e.to_string())
    }
}

/// Errors building a `RegexParser`
#[derive(Debug)]
pub enum ParseError {
    /// Line or delimiter pattern failed to compile
    Regex(regex::Error),
    /// No labels were supplied
    NoLabels,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Regex(e) => write!(f, "invalid pattern: {}", e),
            ParseError::NoLabels => write!(f, "parser needs at least one label"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<regex::Error> for ParseError {
    fn from(e: regex::Error) -> Self {
        ParseError::Regex(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_error_messages() {
        assert_eq!(PersistError::Closed.to_string(), "RowPersister: write after end");
        assert_eq!(
            PersistError::NotWritable.to_string(),
            "RowPersister: not a writable stream"
        );
    }

    #[test]
    fn test_store_error_from_io() {
        let io = IoError::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: StoreError = io.into();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(err.to_string().contains("refused"));
    }
}
