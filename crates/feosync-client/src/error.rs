//! Error types for the protocol client.

use http::StatusCode;
use thiserror::Error;

use feosync_core::{CodecError, ValidationError};

/// Errors that can occur talking to a server.
///
/// A 404 is never an error: operations that can miss return `Ok(None)`.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Malformed identity input.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Server answered with a non-success status.
    #[error("{url} response error: {status}")]
    Status { url: String, status: StatusCode },

    /// A required response header was absent.
    #[error("{url} did not return a {header} header")]
    MissingHeader { url: String, header: &'static str },

    /// A response header could not be parsed.
    #[error("{url} returned an invalid {header} header: {reason}")]
    InvalidHeader {
        url: String,
        header: &'static str,
        reason: String,
    },

    /// Declared or actual body length exceeds the configured maximum.
    #[error("{url} returned {length} bytes (max supported is {max})")]
    TooLarge { url: String, length: u64, max: u64 },

    /// Server returned a zero-length body where content was required.
    #[error("{url} returned 0 bytes")]
    EmptyBody { url: String },

    /// Signature does not match the returned bytes.
    #[error("invalid signature for {url}")]
    Verification { url: String },

    /// The profile endpoint returned an item that is not a profile.
    #[error("{url} returned an item that is not a profile")]
    NotAProfile { url: String },

    /// Item or listing bytes could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The request never got a response.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
