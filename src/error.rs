//! Error types for parley

use thiserror::Error;

/// Transport-level failures.
///
/// Every variant is terminal for the connection it occurred on: the caller
/// is expected to close the socket and release its registry entry. Nothing
/// in this category is retried.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Establishing, binding or accepting a socket failed
    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed {
        /// Address the operation targeted
        address: String,
        /// Underlying failure description
        reason: String,
    },

    /// The peer closed the stream (zero-byte read)
    #[error("Connection reset by peer")]
    ConnectionReset,

    /// Operation attempted against a connection that is no longer live
    #[error("Connection to {peer} is closed")]
    ConnectionClosed {
        /// Label of the peer the write was addressed to
        peer: String,
    },

    /// Writing to the socket failed
    #[error("Send failed: {reason}")]
    SendFailed {
        /// Underlying failure description
        reason: String,
    },

    /// Reading from the socket failed
    #[error("Receive failed: {reason}")]
    ReceiveFailed {
        /// Underlying failure description
        reason: String,
    },

    /// A single accumulated message exceeded the size cap
    #[error("Message too large: {size} bytes")]
    MessageTooLarge {
        /// Accumulated size at the point the cap was exceeded
        size: usize,
    },
}

/// Credential exchange failures.
///
/// Terminal for the affected connection only; other connections are never
/// impacted by a rejected handshake.
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// The server refused the presented credential
    #[error("Authorization rejected: {reason}")]
    Rejected {
        /// Why the credential was refused
        reason: String,
    },

    /// The server closed the connection without granting authorization
    #[error("Unauthorized")]
    Unauthorized,
}

/// Configuration validation failures.
///
/// Surfaced before any socket work begins; a start or connect request that
/// fails validation simply does not proceed.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required configuration field was left empty
    #[error("Missing required field: {field}")]
    MissingRequiredField {
        /// Name of the missing field
        field: String,
    },

    /// The configured address could not be resolved
    #[error("Invalid address: {address}")]
    InvalidAddress {
        /// The address as configured
        address: String,
    },
}

/// Main error type for parley operations
#[derive(Error, Debug)]
pub enum Error {
    /// Transport errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Credential exchange errors
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Wire payload errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] crate::protocol::ProtocolError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
