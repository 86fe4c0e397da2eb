//! # Feosync Testkit
//!
//! Testing utilities for feosync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: signing test users and an in-memory network of servers
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust
//! use feosync_testkit::fixtures::{TestNetwork, TestUser};
//!
//! let net = TestNetwork::new();
//! let remote = net.server("https://remote.example.com");
//!
//! let alice = TestUser::from_seed(1);
//! let post = alice.post(1_000);
//! post.store_on(&remote);
//! assert!(remote.has_item(&alice.user_id(), &post.signature));
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use feosync_testkit::generators::item_layouts;
//!
//! proptest! {
//!     #[test]
//!     fn layouts_are_small(layouts in item_layouts(2, 10)) {
//!         prop_assert!(layouts.len() <= 10);
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{SignedItem, TestNetwork, TestUser, LOCAL};
