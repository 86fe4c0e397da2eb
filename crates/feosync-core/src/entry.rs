//! Listing entries and their total order.
//!
//! Servers advertise their content as pages of [`ItemListEntry`]s, newest
//! first. An entry is a descriptor only: the item behind it has not been
//! fetched, and its signature has not been checked.

use std::cmp::Ordering;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::{Signature, UserId};

/// The kind of item an entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
#[repr(u8)]
pub enum ItemType {
    /// The server did not say, or said something we don't know.
    Unknown = 0,
    Post = 1,
    Profile = 2,
    Comment = 3,
}

impl ItemType {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Post,
            2 => Self::Profile,
            3 => Self::Comment,
            _ => Self::Unknown,
        }
    }

    /// Whether items of this type can carry file attachments.
    ///
    /// Unknown types are treated as possibly having attachments.
    pub fn may_have_attachments(self) -> bool {
        matches!(self, Self::Post | Self::Unknown)
    }
}

impl From<u8> for ItemType {
    fn from(value: u8) -> Self {
        Self::from_u8(value)
    }
}

impl From<ItemType> for u8 {
    fn from(value: ItemType) -> Self {
        value.to_u8()
    }
}

/// One entry of a server's paginated listing.
///
/// Identity fields are kept as raw bytes exactly as the server sent them;
/// use [`ItemListEntry::user_id`] and [`ItemListEntry::signature`] to validate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemListEntry {
    pub user_id: Bytes,
    pub signature: Bytes,
    pub timestamp_ms_utc: i64,
    pub item_type: ItemType,
}

impl ItemListEntry {
    /// Build an entry from validated parts.
    pub fn new(
        user_id: &UserId,
        signature: &Signature,
        timestamp_ms_utc: i64,
        item_type: ItemType,
    ) -> Self {
        Self {
            user_id: Bytes::copy_from_slice(user_id.as_bytes()),
            signature: Bytes::copy_from_slice(signature.as_bytes()),
            timestamp_ms_utc,
            item_type,
        }
    }

    pub fn user_id(&self) -> Result<UserId, ValidationError> {
        UserId::from_bytes(&self.user_id)
    }

    pub fn signature(&self) -> Result<Signature, ValidationError> {
        Signature::from_bytes(&self.signature)
    }

    /// True if both entries occupy the same position in the total order.
    pub fn same_position(&self, other: &ItemListEntry) -> bool {
        newest_first(self, other) == Ordering::Equal
    }
}

/// The total order servers list entries in: `(timestamp, signature bytes)`,
/// both descending.
///
/// `Ordering::Less` means `a` comes first (is newer). Signature bytes are
/// compared lexicographically.
pub fn newest_first(a: &ItemListEntry, b: &ItemListEntry) -> Ordering {
    b.timestamp_ms_utc
        .cmp(&a.timestamp_ms_utc)
        .then_with(|| b.signature.as_ref().cmp(a.signature.as_ref()))
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemList {
    /// Entries, newest first.
    pub items: Vec<ItemListEntry>,
    /// Set by the server when there are no further pages.
    pub no_more_items: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(ts: i64, sig: u8) -> ItemListEntry {
        ItemListEntry {
            user_id: Bytes::from_static(&[1u8; 32]),
            signature: Bytes::from(vec![sig; 64]),
            timestamp_ms_utc: ts,
            item_type: ItemType::Post,
        }
    }

    #[test]
    fn test_newer_timestamp_first() {
        assert_eq!(newest_first(&entry(100, 1), &entry(90, 9)), Ordering::Less);
        assert_eq!(newest_first(&entry(90, 9), &entry(100, 1)), Ordering::Greater);
    }

    #[test]
    fn test_signature_breaks_ties_descending() {
        assert_eq!(newest_first(&entry(100, 9), &entry(100, 1)), Ordering::Less);
        assert!(entry(100, 5).same_position(&entry(100, 5)));
    }

    #[test]
    fn test_sort_is_newest_first() {
        let mut entries = vec![entry(1, 0), entry(3, 0), entry(2, 7), entry(2, 8)];
        entries.sort_by(newest_first);
        let keys: Vec<_> = entries
            .iter()
            .map(|e| (e.timestamp_ms_utc, e.signature[0]))
            .collect();
        assert_eq!(keys, vec![(3, 0), (2, 8), (2, 7), (1, 0)]);
    }

    #[test]
    fn test_item_type_unknown_values() {
        assert_eq!(ItemType::from_u8(42), ItemType::Unknown);
        assert_eq!(ItemType::from_u8(ItemType::Comment.to_u8()), ItemType::Comment);
    }

    fn arb_entry() -> impl Strategy<Value = ItemListEntry> {
        (0i64..5, prop::collection::vec(0u8..3, 64)).prop_map(|(ts, sig)| ItemListEntry {
            user_id: Bytes::from_static(&[1u8; 32]),
            signature: Bytes::from(sig),
            timestamp_ms_utc: ts,
            item_type: ItemType::Post,
        })
    }

    proptest! {
        #[test]
        fn test_order_antisymmetric(a in arb_entry(), b in arb_entry()) {
            prop_assert_eq!(newest_first(&a, &b), newest_first(&b, &a).reverse());
        }

        #[test]
        fn test_order_transitive(a in arb_entry(), b in arb_entry(), c in arb_entry()) {
            if newest_first(&a, &b) != Ordering::Greater
                && newest_first(&b, &c) != Ordering::Greater
            {
                prop_assert_ne!(newest_first(&a, &c), Ordering::Greater);
            }
        }

        #[test]
        fn test_order_total(a in arb_entry(), b in arb_entry()) {
            let equal = newest_first(&a, &b) == Ordering::Equal;
            let same_key = a.timestamp_ms_utc == b.timestamp_ms_utc && a.signature == b.signature;
            prop_assert_eq!(equal, same_key);
        }
    }
}
