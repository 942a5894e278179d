//! Server error types.

use std::io;

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the daemon.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (socket, file, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (framing, encoding, etc.).
    #[error("protocol error: {0}")]
    Protocol(#[from] calshare_protocol::ProtocolError),

    /// Authorization store failure.
    #[error("store error: {0}")]
    Store(#[from] calshare_store::StoreError),

    /// Socket path already in use.
    #[error("socket path already in use: {path}")]
    SocketInUse { path: String },

    /// Socket path parent directory does not exist.
    #[error("socket path parent directory does not exist: {path}")]
    SocketPathInvalid { path: String },

    /// Another daemon instance is already running.
    #[error("server is already running (PID file exists: {path})")]
    AlreadyRunning { path: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Shutdown requested.
    #[error("server shutdown requested")]
    Shutdown,
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a socket in use error.
    pub fn socket_in_use(path: impl Into<String>) -> Self {
        Self::SocketInUse { path: path.into() }
    }

    /// Creates a socket path invalid error.
    pub fn socket_path_invalid(path: impl Into<String>) -> Self {
        Self::SocketPathInvalid { path: path.into() }
    }

    /// Creates an already running error.
    pub fn already_running(path: impl Into<String>) -> Self {
        Self::AlreadyRunning { path: path.into() }
    }
}
