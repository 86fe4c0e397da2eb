//! Composable predicates over listed items.
//!
//! The metadata checks (`by_item_type`, `by_user_id`, `by_signature`,
//! `by_timestamp_ms`) are cheap and run before an item is fetched. `by_item`
//! needs the decoded item and runs last.

use std::collections::HashSet;

use feosync_core::{Item, ItemType, Signature, UserId};

/// A predicate deciding which items to keep. Every check defaults to `true`.
pub trait ItemFilter: Send + Sync {
    fn by_item_type(&self, _item_type: ItemType) -> bool {
        true
    }

    fn by_user_id(&self, _user: &UserId) -> bool {
        true
    }

    fn by_signature(&self, _signature: &Signature) -> bool {
        true
    }

    fn by_timestamp_ms(&self, _timestamp_ms_utc: i64) -> bool {
        true
    }

    fn by_item(&self, _item: &Item) -> bool {
        true
    }
}

/// Keeps everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ItemFilter for AllowAll {}

/// Keeps an item only if every inner filter keeps it.
#[derive(Default)]
pub struct MatchAll {
    filters: Vec<Box<dyn ItemFilter>>,
}

impl MatchAll {
    pub fn new(filters: Vec<Box<dyn ItemFilter>>) -> Self {
        Self { filters }
    }

    pub fn with(mut self, filter: impl ItemFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl ItemFilter for MatchAll {
    fn by_item_type(&self, item_type: ItemType) -> bool {
        self.filters.iter().all(|f| f.by_item_type(item_type))
    }

    fn by_user_id(&self, user: &UserId) -> bool {
        self.filters.iter().all(|f| f.by_user_id(user))
    }

    fn by_signature(&self, signature: &Signature) -> bool {
        self.filters.iter().all(|f| f.by_signature(signature))
    }

    fn by_timestamp_ms(&self, timestamp_ms_utc: i64) -> bool {
        self.filters.iter().all(|f| f.by_timestamp_ms(timestamp_ms_utc))
    }

    fn by_item(&self, item: &Item) -> bool {
        self.filters.iter().all(|f| f.by_item(item))
    }
}

/// Drops items by the given users.
#[derive(Debug, Clone, Default)]
pub struct SkipUsers {
    users: HashSet<UserId>,
}

impl SkipUsers {
    pub fn new(users: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            users: users.into_iter().collect(),
        }
    }
}

impl ItemFilter for SkipUsers {
    fn by_user_id(&self, user: &UserId) -> bool {
        !self.users.contains(user)
    }
}

/// Drops items of the given types.
#[derive(Debug, Clone, Default)]
pub struct ExcludeItemTypes {
    types: Vec<ItemType>,
}

impl ExcludeItemTypes {
    pub fn new(types: impl IntoIterator<Item = ItemType>) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }
}

impl ItemFilter for ExcludeItemTypes {
    fn by_item_type(&self, item_type: ItemType) -> bool {
        !self.types.contains(&item_type)
    }
}

/// Keeps posts and comments whose text contains a string, ignoring case.
///
/// Other kinds of item carry no searchable text and are kept.
#[derive(Debug, Clone)]
pub struct FindMatchingString {
    needle: String,
}

impl FindMatchingString {
    pub fn new(search: &str) -> Self {
        Self {
            needle: search.to_lowercase(),
        }
    }
}

impl ItemFilter for FindMatchingString {
    fn by_item(&self, item: &Item) -> bool {
        match item.text() {
            Some(text) => text.to_lowercase().contains(&self.needle),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feosync_core::{ItemKind, Post, Profile};

    fn post(body: &str) -> Item {
        Item::new(
            1,
            ItemKind::Post(Post {
                body: body.into(),
                ..Post::default()
            }),
        )
    }

    #[test]
    fn test_find_matching_string_ignores_case() {
        let filter = FindMatchingString::new("Rust");
        assert!(filter.by_item(&post("I like rUST a lot")));
        assert!(!filter.by_item(&post("I like Go")));
        // Punctuation is literal, not a pattern.
        assert!(FindMatchingString::new("a.c").by_item(&post("xa.cx")));
        assert!(!FindMatchingString::new("a.c").by_item(&post("abc")));
    }

    #[test]
    fn test_find_matching_string_keeps_profiles() {
        let profile = Item::new(1, ItemKind::Profile(Profile::default()));
        assert!(FindMatchingString::new("nothing").by_item(&profile));
    }

    #[test]
    fn test_match_all_combines() {
        let alice = feosync_core::PrivateKey::from_seed(&[1; 32]).user_id();
        let bob = feosync_core::PrivateKey::from_seed(&[2; 32]).user_id();

        let filter = MatchAll::default()
            .with(SkipUsers::new([alice]))
            .with(ExcludeItemTypes::new([ItemType::Comment]))
            .with(FindMatchingString::new("hello"));

        assert!(!filter.by_user_id(&alice));
        assert!(filter.by_user_id(&bob));
        assert!(!filter.by_item_type(ItemType::Comment));
        assert!(filter.by_item_type(ItemType::Post));
        assert!(filter.by_timestamp_ms(5));
        assert!(filter.by_item(&post("Hello world")));
        assert!(!filter.by_item(&post("goodbye")));
    }

    #[test]
    fn test_empty_match_all_keeps_everything() {
        let filter = MatchAll::default();
        assert!(filter.by_item_type(ItemType::Unknown));
        assert!(filter.by_item(&post("")));
        assert!(AllowAll.by_item(&post("")));
    }
}
