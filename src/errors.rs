//! Errors.

use std::io;

/// Top-level error type returned across component boundaries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("shutting down")]
    ShuttingDown,
}

/// Errors raised by the [`crate::storage`] sink.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to open sink file {path}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write batch for application {application}")]
    Write {
        application: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors raised while driving a single client connection.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("read timed out")]
    ReadTimeout,
}
