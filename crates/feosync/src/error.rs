//! Error types for feosync.

use thiserror::Error;

use feosync_client::ClientError;
use feosync_core::{CodecError, ValidationError};
use feosync_engine::SyncError;

/// Errors that can stop a feed sync or publish.
#[derive(Debug, Error)]
pub enum Error {
    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Request to a server failed.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Item encoding error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Result type for feosync operations.
pub type Result<T> = std::result::Result<T, Error>;
