//! Proptest generators for property-based testing.

use proptest::prelude::*;

use feosync_core::{ItemListEntry, ItemType, PrivateKey, Signature, UserId};

/// Generate a random signing key.
pub fn private_key() -> impl Strategy<Value = PrivateKey> {
    any::<[u8; 32]>().prop_map(|seed| PrivateKey::from_seed(&seed))
}

/// Generate a random user ID.
pub fn user_id() -> impl Strategy<Value = UserId> {
    private_key().prop_map(|key| key.user_id())
}

/// Generate arbitrary signature bytes. Not a valid signature of anything.
pub fn signature() -> impl Strategy<Value = Signature> {
    prop::collection::vec(any::<u8>(), 64)
        .prop_map(|bytes| Signature::from_bytes(&bytes).expect("64 bytes is a signature"))
}

/// Generate a timestamp from a small range, so collisions are common.
pub fn timestamp() -> impl Strategy<Value = i64> {
    1i64..=50
}

pub fn item_type() -> impl Strategy<Value = ItemType> {
    prop_oneof![
        Just(ItemType::Post),
        Just(ItemType::Profile),
        Just(ItemType::Comment),
        Just(ItemType::Unknown),
    ]
}

/// Generate a listing entry.
pub fn list_entry() -> impl Strategy<Value = ItemListEntry> {
    (user_id(), signature(), timestamp(), item_type())
        .prop_map(|(user, sig, ts, item_type)| ItemListEntry::new(&user, &sig, ts, item_type))
}

/// Where one item lives in a sync scenario.
#[derive(Debug, Clone)]
pub struct ItemLayout {
    pub timestamp_ms_utc: i64,
    pub on_local: bool,
    /// One flag per remote server.
    pub on_remotes: Vec<bool>,
}

/// Generate up to `max_items` item placements across a local server and
/// `remotes` remote servers.
pub fn item_layouts(remotes: usize, max_items: usize) -> impl Strategy<Value = Vec<ItemLayout>> {
    let layout = (
        timestamp(),
        any::<bool>(),
        prop::collection::vec(any::<bool>(), remotes),
    )
        .prop_map(|(timestamp_ms_utc, on_local, on_remotes)| ItemLayout {
            timestamp_ms_utc,
            on_local,
            on_remotes,
        });
    prop::collection::vec(layout, 0..=max_items)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_layouts_have_one_flag_per_remote(layouts in item_layouts(3, 8)) {
            prop_assert!(layouts.len() <= 8);
            for layout in &layouts {
                prop_assert_eq!(layout.on_remotes.len(), 3);
            }
        }

        #[test]
        fn test_entries_have_valid_ids(entry in list_entry()) {
            prop_assert!(entry.user_id().is_ok());
            prop_assert!(entry.signature().is_ok());
        }
    }
}
