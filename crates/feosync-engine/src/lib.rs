//! # Feosync Engine
//!
//! Replicates users' signed items and attachments between servers.
//!
//! ## Components
//!
//! - [`MissingItems`] - Diffs listings across servers into [`CopyTask`]s
//! - [`sync_user_items`] - Runs copy tasks for one user, a few at a time
//! - [`sync_attachment`] / [`send_attachment_multi`] - Attachment backfill and fan-out
//! - [`sync_user_profile`] - Last-writer-wins profile merge
//! - [`prefetch`] - Bounded, order-preserving concurrent map over a stream
//! - [`LazyItemLoader`] - Filtered, on-demand item loading
//! - [`TaskTracker`] - Nested progress and soft-error reporting
//!
//! ## Failure model
//!
//! A sync run never retries. Failures that only affect one item, attachment
//! or server are reported on the [`TaskTracker`] and skipped. Everything is
//! content-addressed, so running the sync again picks up where it failed.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use feosync_engine::{sync_user_items, SyncOptions, TaskTracker};
//!
//! let tracker = TaskTracker::new();
//! let summary = tracker
//!     .run("Sync", |tracker| async move {
//!         sync_user_items(&tracker, &local, &user, &servers, &SyncOptions::default(), 4).await
//!     })
//!     .await?;
//! ```

pub mod attachments;
pub mod config;
pub mod copy;
pub mod error;
pub mod filter;
pub mod loader;
pub mod merge;
pub mod mutex;
pub mod prefetch;
pub mod profile;
pub mod tracker;

pub use attachments::{
    send_attachment_multi, sync_attachment, sync_feed_attachments, sync_user_attachments,
    AttachmentBudget,
};
pub use config::{BackfillOptions, SyncOptions, DEFAULT_PREFETCH_CONCURRENCY};
pub use copy::{sync_user_item, sync_user_items, CopyResult, UserSyncSummary};
pub use error::{Result, SyncError};
pub use filter::{AllowAll, ExcludeItemTypes, FindMatchingString, ItemFilter, MatchAll, SkipUsers};
pub use loader::{DisplayItem, LazyItemLoader};
pub use merge::{CopyTask, MissingItems};
pub use mutex::Mutex;
pub use prefetch::{prefetch, Prefetch};
pub use profile::{servers_from_profile, sync_user_profile, union_servers};
pub use tracker::{format_elapsed, LogEntry, LogLevel, TaskTracker};
