//! # Feosync
//!
//! Replication for a federated, self-hosted blogging network: users sign
//! their own posts, and any server can carry any user's items.
//!
//! ## Overview
//!
//! Feosync keeps a local server in step with the rest of the network:
//!
//! - **Feed sync**: Pull the current user's items and their follows' items
//!   from the servers their profiles declare
//! - **Publishing**: Push the user's items and attachments to their servers
//! - **Backfill**: Fetch missing attachments of already synced items, within
//!   a byte budget
//! - **Profiles**: Keep the newest profile of each followed user
//!
//! ## Key Concepts
//!
//! - **Item**: Signed by its author. Immutable, addressed by `(user, signature)`.
//! - **Listing**: A server's newest-first, paginated view of a user's items.
//! - **Soft failure**: Most errors only skip an item, file or server. They are
//!   recorded on a [`TaskTracker`] and the sync carries on.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use feosync::{Syncer, SyncerConfig, TaskTracker};
//! use feosync::core::UserId;
//!
//! async fn example(user: UserId) {
//!     let syncer = Syncer::with_http("http://localhost:8080", SyncerConfig::default());
//!
//!     let tracker = TaskTracker::new();
//!     let output = tracker
//!         .run("Sync my feed", |tracker| async move {
//!             syncer.sync_my_feed(&tracker, &user).await
//!         })
//!         .await;
//!
//!     for entry in tracker.logs() {
//!         println!("{:?} {}", entry.level, entry.message);
//!     }
//!     let _ = output;
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `feosync::core` - Identities, items, listings and the item codec
//! - `feosync::client` - Protocol client and the in-memory test network
//! - `feosync::engine` - Merge, copy, attachment and progress machinery

pub mod error;
pub mod syncer;

// Re-export component crates
pub use feosync_client as client;
pub use feosync_core as core;
pub use feosync_engine as engine;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use syncer::{PublishSummary, SyncOutput, Syncer, SyncerConfig};

// Re-export commonly used types
pub use feosync_client::{Client, ClientConfig, ClientError};
pub use feosync_core::{Item, ItemListEntry, Signature, UserId};
pub use feosync_engine::{
    BackfillOptions, DisplayItem, LazyItemLoader, LogLevel, SyncError, SyncOptions, TaskTracker,
};
