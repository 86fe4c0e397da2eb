//! Error types for feosync core.

use thiserror::Error;

/// Malformed identity or signature input.
///
/// These are caller errors: they are raised at construction and never
/// silently recovered from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} is not valid base58")]
    InvalidBase58(&'static str),

    #[error("{what} too short: expected {expected} bytes, got {got}")]
    TooShort {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{what} too long: expected {expected} bytes, got {got}")]
    TooLong {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("UserID too long (this may be a private key)")]
    LooksLikePrivateKey,

    #[error("invalid private key checksum")]
    BadChecksum,

    #[error("invalid server URL {url:?}: {reason}")]
    InvalidServerUrl { url: String, reason: &'static str },

    #[error("invalid item: {0}")]
    InvalidItem(&'static str),
}

/// Errors from encoding or decoding items and item lists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("encoding error: {0}")]
    Encode(String),

    #[error("decoding error: {0}")]
    Decode(String),
}
