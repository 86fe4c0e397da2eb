//! Options for a sync run.

use serde::{Deserialize, Serialize};

/// Default number of items fetched concurrently.
pub const DEFAULT_PREFETCH_CONCURRENCY: usize = 4;

/// What to sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Sync only from this server instead of the servers users declare.
    pub source_server: Option<String>,

    /// Stop once this many recent items (of any type) are on the local
    /// server. `None` syncs everything.
    pub recent_items: Option<usize>,

    /// Stop at items older than this timestamp (Unix milliseconds).
    pub to_date_utc_ms: Option<i64>,

    /// Also copy missing attachments of already synced items.
    pub backfill: Option<BackfillOptions>,
}

/// Attachment backfill settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillOptions {
    /// Stop backfilling after copying this many bytes. `Some(0)` disables
    /// attachment backfill.
    pub max_attachment_bytes_total: Option<u64>,
}
