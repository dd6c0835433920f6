//! Error types for RespKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for RespKV operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Wire Format Errors
    // -------------------------------------------------------------------------
    /// Malformed or undecodable frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Not enough bytes buffered to finish the current frame.
    ///
    /// Only produced inside the decoder; the public decode functions
    /// report it as `Ok(None)`.
    #[error("Incomplete frame: need more data")]
    IncompleteFrame,

    /// A value that cannot be represented on the wire
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    // -------------------------------------------------------------------------
    // Command Errors
    // -------------------------------------------------------------------------
    /// Missing/invalid arguments or unknown command; sent back as an
    /// error reply and never closes the connection
    #[error("{0}")]
    Command(String),

    /// Error reply returned by the server for a command
    #[error("{0}")]
    Server(String),

    // -------------------------------------------------------------------------
    // Connection Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Too many pending requests (capacity {capacity})")]
    Backpressure { capacity: usize },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
