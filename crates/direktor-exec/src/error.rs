//! Error types for direktor-exec

use thiserror::Error;

/// Errors that can occur at the transport layer
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Failed to connect to remote host
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Private key material could not be decoded
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// I/O error during execution
    #[error("I/O error: {0}")]
    Io(String),

    /// Connection not established
    #[error("not connected")]
    NotConnected,
}
