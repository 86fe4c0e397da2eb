//! # Feosync Core
//!
//! Pure primitives for feosync: identities, signatures, listing entries and items.
//!
//! This crate contains no I/O and no networking. It is pure computation over
//! signed content.
//!
//! ## Key Types
//!
//! - [`UserId`] - A 32-byte Ed25519 public key, rendered as base58
//! - [`Signature`] - A 64-byte detached Ed25519 signature
//! - [`PrivateKey`] - A signing seed, rendered as base58check
//! - [`ItemListEntry`] - An unverified descriptor from a server listing
//! - [`Item`] - A decoded item (post, profile or comment)
//!
//! ## Signatures cover bytes
//!
//! A signature is computed over the exact bytes a server stores. Never decode
//! and re-encode an [`Item`] and expect the signature to still hold; keep the
//! original bytes around instead.
//!
//! ## Codecs
//!
//! The binary schema of items is behind the [`ItemCodec`] trait. [`CborCodec`]
//! is the bundled implementation.

pub mod codec;
pub mod entry;
pub mod error;
pub mod identity;
pub mod item;
pub mod size;

pub use codec::{CborCodec, ItemCodec};
pub use entry::{newest_first, ItemList, ItemListEntry, ItemType};
pub use error::{CodecError, ValidationError};
pub use identity::{PrivateKey, Signature, UserId};
pub use item::{
    validate_server_url, Attachment, Comment, Follow, Item, ItemKind, Post, Profile, ReplyRef,
    Server,
};
pub use size::readable_size;
