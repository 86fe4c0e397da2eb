//! Lazily load and filter items from a listing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use tracing::{debug, error};

use feosync_client::{Client, ClientError, GetItemOptions, ItemStream};
use feosync_core::{Item, ItemListEntry, Signature, UserId};

use crate::filter::ItemFilter;
use crate::mutex::Mutex;
use crate::prefetch::prefetch;

/// How many items to fetch ahead of the caller.
const LOADER_CONCURRENCY: usize = 4;

/// A verified item ready to show.
#[derive(Debug, Clone)]
pub struct DisplayItem {
    pub user_id: UserId,
    pub signature: Signature,
    pub item: Item,
}

/// `Err` only for a failed listing; items that fail to load are filtered.
type Loaded = std::result::Result<Option<DisplayItem>, ClientError>;

/// Fetches items from a listing on demand, a few at a time.
///
/// Items are prefetched ahead of the caller, filtered, and checked against
/// their signatures before being returned.
pub struct LazyItemLoader {
    items: Mutex<Option<BoxStream<'static, Loaded>>>,
    done: Arc<AtomicBool>,
}

impl LazyItemLoader {
    /// Load items listed by `source` from `client`, keeping those `filter`
    /// accepts.
    pub fn new(client: Client, source: ItemStream, filter: Arc<dyn ItemFilter>) -> Self {
        let items = prefetch(source, LOADER_CONCURRENCY, move |entry| {
            let client = client.clone();
            let filter = filter.clone();
            async move { load_entry(&client, filter.as_ref(), entry).await }
        })
        .boxed();

        Self {
            items: Mutex::new(Some(items)),
            done: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get up to the next `count` items.
    ///
    /// Returns fewer once the listing runs out or the loader is stopped.
    /// Concurrent calls are served one at a time, in order.
    pub async fn load_more(&self, count: usize) -> Vec<DisplayItem> {
        let done = self.done.clone();
        self.items
            .run(move |items| {
                async move {
                    let mut out = Vec::new();
                    while out.len() < count {
                        if done.load(Ordering::SeqCst) {
                            // Aborts anything still prefetching.
                            *items = None;
                        }
                        let Some(stream) = items.as_mut() else {
                            break;
                        };
                        match stream.next().await {
                            Some(Ok(Some(item))) => out.push(item),
                            Some(Ok(None)) => {}
                            Some(Err(e)) => {
                                error!("Error reading item listing: {e}");
                                done.store(true, Ordering::SeqCst);
                            }
                            None => done.store(true, Ordering::SeqCst),
                        }
                    }
                    out
                }
                .boxed()
            })
            .await
    }

    /// Stop loading. Later calls to [`load_more`](Self::load_more) return
    /// nothing.
    pub fn stop(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

async fn load_entry(
    client: &Client,
    filter: &dyn ItemFilter,
    entry: std::result::Result<ItemListEntry, ClientError>,
) -> Loaded {
    Ok(fetch_display_item(client, filter, entry?).await)
}

/// Fetch one listed item. `None` if it was filtered out or failed to load.
async fn fetch_display_item(
    client: &Client,
    filter: &dyn ItemFilter,
    entry: ItemListEntry,
) -> Option<DisplayItem> {
    if !filter.by_item_type(entry.item_type) || !filter.by_timestamp_ms(entry.timestamp_ms_utc) {
        return None;
    }

    let (user_id, signature) = match (entry.user_id(), entry.signature()) {
        (Ok(user_id), Ok(signature)) => (user_id, signature),
        (Err(e), _) | (_, Err(e)) => {
            error!("Malformed listing entry from {}: {e}", client.url());
            return None;
        }
    };
    if !filter.by_user_id(&user_id) || !filter.by_signature(&signature) {
        return None;
    }

    // Verify last: most items may be filtered out by content.
    let bytes = match client
        .get_item_bytes(&user_id, &signature, GetItemOptions::unverified())
        .await
    {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            error!(%user_id, %signature, "Server advertises, but doesn't have item");
            return None;
        }
        Err(e) => {
            error!(%user_id, %signature, "Error loading item: {e}");
            return None;
        }
    };
    let item = match client.codec().decode_item(&bytes) {
        Ok(item) => item,
        Err(e) => {
            error!(%user_id, %signature, "Error decoding item: {e}");
            return None;
        }
    };

    if !filter.by_item(&item) {
        debug!(%signature, "filtered out by content");
        return None;
    }

    if !signature.verify(&user_id, &bytes) {
        error!(%user_id, %signature, "Invalid signature for item. Filtering out.");
        return None;
    }

    Some(DisplayItem {
        user_id,
        signature,
        item,
    })
}
