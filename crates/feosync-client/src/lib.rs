//! # Feosync Client
//!
//! Talks to feosync servers over their REST surface.
//!
//! ## Components
//!
//! - [`Client`] - One server: items, profiles, attachments and listings
//! - [`Fetch`] - Transport abstraction; [`HttpFetch`] is the `reqwest` one
//! - [`ItemStream`] - A lazily paginated listing
//! - [`MemoryNetwork`] - In-memory servers for tests
//!
//! ## Failure semantics
//!
//! A 404 is `Ok(None)`. Anything else unexpected is a [`ClientError`]. The
//! client never retries.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use feosync_client::{Client, ClientConfig, HttpFetch};
//! use feosync_core::CborCodec;
//!
//! let client = Client::new(
//!     "https://blog.example.com",
//!     Arc::new(HttpFetch::new()),
//!     Arc::new(CborCodec),
//!     ClientConfig::default(),
//! );
//! let profile = client.get_profile(&user_id).await?;
//! ```

pub mod client;
pub mod error;
pub mod fetch;
pub mod listing;
pub mod memory;

pub use client::{
    encode_path_segment, AttachmentMeta, Client, ClientConfig, GetItemOptions, ProfileResult,
    QUOTA_EXCEEDED_HEADER, SIGNATURE_HEADER,
};
pub use error::{ClientError, Result};
pub use fetch::{Fetch, FetchRequest, FetchResponse, HttpFetch};
pub use listing::{ItemStream, ListingKind, ListingOffset};
pub use memory::{MemoryNetwork, MemoryServer, RecordedRequest};
