//! Copying items between servers.

use std::slice;

use futures_util::StreamExt;

use feosync_client::{Client, ClientError, GetItemOptions};
use feosync_core::{readable_size, UserId};

use crate::attachments::sync_attachment;
use crate::config::SyncOptions;
use crate::error::{Result, SyncError};
use crate::merge::{CopyTask, MissingItems};
use crate::prefetch::prefetch;
use crate::tracker::TaskTracker;

/// Outcome of one [`CopyTask`].
#[derive(Debug, Default)]
pub struct CopyResult {
    pub items_copied: usize,
    pub attachments_copied: usize,
    pub bytes_copied: u64,
    /// Reading from the source failed. Only this item is affected.
    pub source_error: Option<ClientError>,
    /// Writing to the destination failed. Likely to affect later items too.
    pub dest_error: Option<ClientError>,
}

/// Totals for one user's item sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserSyncSummary {
    pub items_copied: usize,
    pub attachments_copied: usize,
    pub bytes_copied: u64,
    /// The run stopped at a destination write error.
    pub stopped_early: bool,
}

/// Copy one item, then any attachments it references.
///
/// The item is read without checking its signature: the destination checks
/// it on write. Attachment failures never undo a copied item.
pub async fn sync_user_item(task: CopyTask, tracker: TaskTracker) -> CopyResult {
    let CopyTask {
        user_id,
        signature,
        from,
        to,
    } = task;
    let mut result = CopyResult::default();

    tracker.log_temp(format!("Copying {signature}"));

    let bytes = match from
        .get_item_bytes(&user_id, &signature, GetItemOptions::unverified())
        .await
    {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            // It was just listed there, but don't let that block the rest.
            tracker.warn(format!(
                "404 (not found) from server {} for item {signature}",
                from.url()
            ));
            return result;
        }
        Err(e) => {
            tracker.warn(format!("Error reading item {signature} from {}: {e}", from.url()));
            result.source_error = Some(e);
            return result;
        }
    };

    if let Err(e) = to.put_item(&user_id, &signature, bytes.clone()).await {
        result.dest_error = Some(e);
        return result;
    }
    result.items_copied += 1;

    let item = match to.codec().decode_item(&bytes) {
        Ok(item) => item,
        Err(_) => {
            tracker.warn(format!(
                "Error deserializing item {signature}. Won't be able to copy attachments if they exist."
            ));
            return result;
        }
    };

    for attachment in item.attachments() {
        let copied = sync_attachment(
            &tracker,
            &user_id,
            &signature,
            &attachment.name,
            &to,
            slice::from_ref(&from),
        )
        .await;
        if copied > 0 {
            result.attachments_copied += 1;
            result.bytes_copied += copied;
        }
    }

    result
}

/// Copy the items `user` has on `servers` but not on `local`.
///
/// Items are copied newest first, `concurrency` at a time. The first failed
/// write to `local` stops this user's sync: it usually means the user can't
/// post there or is out of quota.
pub async fn sync_user_items(
    tracker: &TaskTracker,
    local: &Client,
    user: &UserId,
    servers: &[String],
    options: &SyncOptions,
    concurrency: usize,
) -> Result<UserSyncSummary> {
    if servers.is_empty() {
        tracker.warn(format!("No servers found to sync {user}"));
        return Ok(UserSyncSummary::default());
    }

    let remotes: Vec<Client> = servers
        .iter()
        .map(|url| local.for_server(url.as_str()))
        .collect();

    let summary = tracker
        .run_subtask(format!("Syncing from {}", servers.join(", ")), |tracker| async move {
            let tasks = MissingItems::new(&tracker, local, user, remotes, options).into_stream();
            let copy_tracker = tracker.clone();
            let mut results = prefetch(tasks, concurrency, move |task| {
                sync_user_item(task, copy_tracker.clone())
            });

            let mut summary = UserSyncSummary::default();
            while let Some(result) = results.next().await {
                summary.items_copied += result.items_copied;
                summary.attachments_copied += result.attachments_copied;
                summary.bytes_copied += result.bytes_copied;

                if let Some(e) = result.dest_error {
                    tracker.error(format!("Error saving item: {e}"));
                    tracker.warn(
                        "This may mean that the user can not post to the server, or has exceeded their quota.",
                    );
                    summary.stopped_early = true;
                    break;
                }
            }
            Ok::<_, SyncError>(summary)
        })
        .await?;

    tracker.log(format!("Copied {} new items", summary.items_copied));
    if summary.attachments_copied > 0 {
        tracker.log(format!(
            "Copied {} attachments totalling {}",
            summary.attachments_copied,
            readable_size(summary.bytes_copied)
        ));
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use feosync_testkit::{TestNetwork, TestUser};

    const X: &str = "https://x.example";
    const Y: &str = "https://y.example";

    fn servers(urls: &[&str]) -> Vec<String> {
        urls.iter().map(|url| url.to_string()).collect()
    }

    #[tokio::test]
    async fn test_copies_missing_items_and_attachments() {
        let net = TestNetwork::new();
        let user = TestUser::new();
        let (local, x, y) = (net.local_server(), net.server(X), net.server(Y));

        let old = user.post(10);
        old.store_on(&local);
        old.store_on(&x);
        let with_file = user.post_with_files(20, &[("song.mp3", 5)]);
        with_file.store_on(&x);
        with_file.store_file_on(&x, "song.mp3", b"la la");
        let newest = user.post(30);
        newest.store_on(&y);

        let tracker = TaskTracker::new();
        let summary = sync_user_items(
            &tracker,
            &net.local_client(),
            &user.user_id(),
            &servers(&[X, Y]),
            &SyncOptions::default(),
            4,
        )
        .await
        .unwrap();

        assert_eq!(summary.items_copied, 2);
        assert_eq!(summary.attachments_copied, 1);
        assert_eq!(summary.bytes_copied, 5);
        assert!(!summary.stopped_early);
        assert_eq!(local.user_item_count(&user.user_id()), 3);
        assert!(local.has_attachment(&user.user_id(), &with_file.signature, "song.mp3"));
        assert_eq!(tracker.error_count(), 0);
    }

    #[tokio::test]
    async fn test_second_sync_copies_nothing() {
        let net = TestNetwork::new();
        let user = TestUser::new();
        let x = net.server(X);
        for ts in 1..=5 {
            user.post(ts).store_on(&x);
        }

        let local = net.local_client();
        let tracker = TaskTracker::new();
        let options = SyncOptions::default();
        let sources = servers(&[X]);
        let first = sync_user_items(&tracker, &local, &user.user_id(), &sources, &options, 2)
            .await
            .unwrap();
        let second = sync_user_items(&tracker, &local, &user.user_id(), &sources, &options, 2)
            .await
            .unwrap();

        assert_eq!(first.items_copied, 5);
        assert_eq!(second.items_copied, 0);
    }

    #[tokio::test]
    async fn test_write_failure_stops_the_user() {
        let net = TestNetwork::new();
        let user = TestUser::new();
        let x = net.server(X);
        for ts in 1..=6 {
            user.post(ts).store_on(&x);
        }
        let local = net.local_server();
        local.set_fail_item_puts(true);

        let tracker = TaskTracker::new();
        let summary = sync_user_items(
            &tracker,
            &net.local_client(),
            &user.user_id(),
            &servers(&[X]),
            &SyncOptions::default(),
            1,
        )
        .await
        .unwrap();

        assert!(summary.stopped_early);
        assert_eq!(summary.items_copied, 0);
        assert_eq!(tracker.error_count(), 1);
        // One PUT fails, the rest are never attempted.
        assert_eq!(local.count_requests(&http::Method::PUT, "/i/"), 1);
    }

    #[tokio::test]
    async fn test_no_servers_warns() {
        let net = TestNetwork::new();
        let user = TestUser::new();
        let tracker = TaskTracker::new();
        let summary = sync_user_items(
            &tracker,
            &net.local_client(),
            &user.user_id(),
            &[],
            &SyncOptions::default(),
            4,
        )
        .await
        .unwrap();

        assert_eq!(summary, UserSyncSummary::default());
        assert_eq!(tracker.warn_count(), 1);
    }

    #[tokio::test]
    async fn test_source_error_is_soft() {
        let net = TestNetwork::new();
        let user = TestUser::new();
        let x = net.server(X);
        let post = user.post(1);
        post.store_on(&x);
        x.set_omit_content_length(true);

        let tracker = TaskTracker::new();
        let task = CopyTask {
            user_id: user.user_id(),
            signature: post.signature,
            from: net.client(X),
            to: net.local_client(),
        };
        let result = sync_user_item(task, tracker.clone()).await;
        assert!(result.source_error.is_some());
        assert!(result.dest_error.is_none());
        assert_eq!(result.items_copied, 0);
        assert_eq!(tracker.warn_count(), 1);
        assert!(!net.local_server().has_item(&user.user_id(), &post.signature));
    }
}
