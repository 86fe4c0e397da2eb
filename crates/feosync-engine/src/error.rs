//! Error types for the sync engine.

use thiserror::Error;

use feosync_client::ClientError;
use feosync_core::{UserId, ValidationError};

/// Errors that can stop a sync run.
///
/// Most failures during a sync are soft: they are reported through a
/// [`TaskTracker`](crate::TaskTracker) and the run continues. Only the
/// variants here are ever returned to the caller.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No server to sync with was given or declared.
    #[error("no servers to sync with")]
    NoSyncSources,

    /// The user has no profile on the local server.
    #[error("user {0} has no local profile")]
    NoProfile(UserId),

    /// A request failed.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Malformed identity data.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A task could not continue.
    #[error("task failed: {0}")]
    TaskFailed(String),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
