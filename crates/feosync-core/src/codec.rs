//! Item codecs.
//!
//! The binary schema of items and listing pages lives behind [`ItemCodec`].
//! Feosync only needs the codec to be deterministic in one direction: the
//! bytes it encodes are the bytes that get signed. Decoding never has to
//! reproduce them.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::entry::ItemList;
use crate::error::CodecError;
use crate::item::Item;

/// Serializes items and item list pages.
pub trait ItemCodec: Send + Sync + fmt::Debug {
    /// Path segment naming this format in server URLs, e.g. `/u/{id}/i/{sig}/cbor`.
    fn format(&self) -> &str;

    fn encode_item(&self, item: &Item) -> Result<Vec<u8>, CodecError>;

    fn decode_item(&self, bytes: &[u8]) -> Result<Item, CodecError>;

    fn encode_item_list(&self, list: &ItemList) -> Result<Vec<u8>, CodecError>;

    fn decode_item_list(&self, bytes: &[u8]) -> Result<ItemList, CodecError>;
}

/// CBOR encoding via `ciborium`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl CborCodec {
    /// Path segment used by this codec.
    pub const FORMAT: &'static str = "cbor";

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf).map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(buf)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
        ciborium::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

impl ItemCodec for CborCodec {
    fn format(&self) -> &str {
        Self::FORMAT
    }

    fn encode_item(&self, item: &Item) -> Result<Vec<u8>, CodecError> {
        Self::encode(item)
    }

    fn decode_item(&self, bytes: &[u8]) -> Result<Item, CodecError> {
        Self::decode(bytes)
    }

    fn encode_item_list(&self, list: &ItemList) -> Result<Vec<u8>, CodecError> {
        Self::encode(list)
    }

    fn decode_item_list(&self, bytes: &[u8]) -> Result<ItemList, CodecError> {
        Self::decode(bytes)
    }
}
