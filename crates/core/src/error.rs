//! Error types for the skiff FTP engine

use thiserror::Error;

/// Result type alias for skiff-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can escape the engine to the caller.
///
/// Command-level failures never show up here: they are converted to
/// [`crate::reply::Reply`] values inside the command handlers and travel
/// back to the client over the control channel.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to bind a listening socket
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that could not be bound
        addr: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed data on the control channel
    #[error("Protocol error: {0}")]
    Protocol(String),
}
