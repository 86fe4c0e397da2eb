//! Feed sync and post publishing for one local server.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use feosync_client::{Client, ClientConfig, GetItemOptions, HttpFetch, ProfileResult};
use feosync_core::{readable_size, CborCodec, Follow, ItemType, Signature, UserId};
use feosync_engine::{
    prefetch, send_attachment_multi, servers_from_profile, sync_feed_attachments, sync_user_item,
    sync_user_profile, union_servers, AttachmentBudget, CopyTask, SyncError, SyncOptions,
    TaskTracker, UserSyncSummary, DEFAULT_PREFETCH_CONCURRENCY,
};

use crate::error::{Error, Result};

/// Configuration for a [`Syncer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncerConfig {
    /// Client tuning for every server contacted.
    pub client: ClientConfig,
    /// Items copied concurrently per user.
    pub prefetch_concurrency: usize,
    /// What [`Syncer::sync_my_feed`] syncs.
    pub options: SyncOptions,
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            prefetch_concurrency: DEFAULT_PREFETCH_CONCURRENCY,
            options: SyncOptions::default(),
        }
    }
}

/// Outcome of [`Syncer::sync_my_feed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutput {
    /// A newer profile for the current user arrived on the local server.
    pub updated_user_profile: bool,
    pub items_copied: usize,
    pub attachment_bytes_copied: u64,
}

/// Outcome of [`Syncer::publish_my_posts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub servers: usize,
    /// Servers skipped after a listing or write error.
    pub servers_failed: usize,
    pub items_copied: usize,
    pub attachment_bytes_copied: u64,
}

/// Syncs between a local server and the servers its users declare.
///
/// The local server is the one the user reads from. [`sync_my_feed`]
/// pulls the user's own items and their follows' items into it, and
/// [`publish_my_posts`] pushes the user's items out of it.
///
/// [`sync_my_feed`]: Syncer::sync_my_feed
/// [`publish_my_posts`]: Syncer::publish_my_posts
#[derive(Clone)]
pub struct Syncer {
    local: Client,
    config: SyncerConfig,
}

impl Syncer {
    pub fn new(local: Client, config: SyncerConfig) -> Self {
        Self { local, config }
    }

    /// A syncer talking HTTP to the local server at `base_url`.
    pub fn with_http(base_url: impl Into<String>, config: SyncerConfig) -> Self {
        let local = Client::new(
            base_url,
            Arc::new(HttpFetch::new()),
            Arc::new(CborCodec),
            config.client,
        );
        Self::new(local, config)
    }

    pub fn local(&self) -> &Client {
        &self.local
    }

    pub fn config(&self) -> &SyncerConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Feed Sync
    // ─────────────────────────────────────────────────────────────────────────

    /// Copy `user`'s items from `servers` to the local server.
    pub async fn sync_user_items(
        &self,
        tracker: &TaskTracker,
        user: &UserId,
        servers: &[String],
    ) -> Result<UserSyncSummary> {
        let summary = feosync_engine::sync_user_items(
            tracker,
            &self.local,
            user,
            servers,
            &self.config.options,
            self.config.prefetch_concurrency,
        )
        .await?;
        Ok(summary)
    }

    /// Bring the local server up to date with `user`'s feed.
    ///
    /// Syncs the user's own items, then each follow's items, then (with
    /// backfill enabled) missing attachments. Sources are the configured
    /// source server, or else the servers in the user's local profile.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError::NoProfile`] when no source server is set
    /// and the user has no local profile. Failures that only affect one
    /// follow, item or file are recorded on `tracker` instead.
    pub async fn sync_my_feed(&self, tracker: &TaskTracker, user: &UserId) -> Result<SyncOutput> {
        let local = &self.local;
        let options = &self.config.options;
        let source_server = options.source_server.as_deref();
        let mut output = SyncOutput::default();

        let mut my_profile: Option<ProfileResult> = None;
        let mut sync_servers = match source_server {
            Some(server) => vec![server.to_string()],
            None => {
                let Some(result) = local.get_profile(user).await? else {
                    return Err(SyncError::NoProfile(*user).into());
                };
                let servers = servers_from_profile(&result.profile, tracker);
                my_profile = Some(result);
                servers
            }
        };

        if sync_servers.is_empty() {
            tracker.warn("No servers specified for current user. Can't sync current user's items.");
        } else {
            let servers = &sync_servers;
            let summary = tracker
                .run_subtask("Current user's items", |tracker| async move {
                    self.sync_user_items(&tracker, user, servers).await
                })
                .await?;
            output.items_copied += summary.items_copied;

            // The sync may have brought in a newer profile.
            if let Some(result) = local.get_profile(user).await? {
                let newer = my_profile
                    .as_ref()
                    .map_or(true, |current| result.timestamp_ms_utc > current.timestamp_ms_utc);
                if newer {
                    debug!(user = %user, timestamp = result.timestamp_ms_utc, "profile updated");
                    output.updated_user_profile = true;
                    if source_server.is_none() {
                        sync_servers = servers_from_profile(&result.profile, &TaskTracker::new());
                    }
                    my_profile = Some(result);
                }
            }
        }

        let my_profile = my_profile.as_ref();
        let servers = &sync_servers;
        output.items_copied += tracker
            .run_subtask("Follows' items", |tracker| async move {
                let Some(profile) = my_profile else {
                    tracker.warn("User has no profile. No follows to sync.");
                    return Ok(0);
                };
                let mut copied = 0;
                for follow in &profile.profile.follows {
                    match self.sync_follow(&tracker, follow, servers).await {
                        Ok(count) => copied += count,
                        Err(e) => tracker.error(format!(
                            "Error syncing follow \"{}\": {e}",
                            follow.display_name
                        )),
                    }
                }
                Ok::<_, Error>(copied)
            })
            .await?;

        if let Some(backfill) = &options.backfill {
            let mut budget = AttachmentBudget::new(backfill.max_attachment_bytes_total);
            if budget.is_exhausted() {
                tracker.log("Attachment backfill disabled.");
            } else {
                let budget = &mut budget;
                let profile = my_profile.map(|result| &result.profile);
                output.attachment_bytes_copied = tracker
                    .run_subtask("Backfilling file attachments", |tracker| async move {
                        let copied = sync_feed_attachments(
                            &tracker,
                            user,
                            profile,
                            source_server,
                            local,
                            budget,
                        )
                        .await;
                        Ok::<_, Error>(copied)
                    })
                    .await?;
            }
        }

        Ok(output)
    }

    /// Sync one followed user. Failures inside the follow's subtask are
    /// recorded there and count as zero items copied.
    async fn sync_follow(
        &self,
        tracker: &TaskTracker,
        follow: &Follow,
        sync_servers: &[String],
    ) -> Result<usize> {
        let local = &self.local;
        let follow_id = follow.user_id()?;
        let followed_profile = local.get_profile(&follow_id).await?;

        // Our own servers first, to lessen load on others.
        let servers = match (&self.config.options.source_server, &followed_profile) {
            (None, Some(result)) => union_servers(
                sync_servers,
                &servers_from_profile(&result.profile, tracker),
            ),
            _ => sync_servers.to_vec(),
        };

        let follow_id = &follow_id;
        let servers = &servers;
        let had_profile = followed_profile.is_some();
        let copied = tracker
            .run_subtask(format!("Items for \"{}\"", follow.display_name), |tracker| async move {
                tracker.log(format!("User ID: {follow_id}"));
                let summary = self.sync_user_items(&tracker, follow_id, servers).await?;

                if !had_profile {
                    let current = local.get_profile(follow_id).await?;
                    let remotes: Vec<Client> = servers
                        .iter()
                        .map(|url| local.for_server(url.as_str()))
                        .collect();
                    let merged = tracker
                        .run_subtask(
                            "No local profile, trying to sync one from remotes",
                            |tracker| async move {
                                sync_user_profile(
                                    &tracker,
                                    local,
                                    follow_id,
                                    current.as_ref(),
                                    &remotes,
                                )
                                .await
                            },
                        )
                        .await;
                    if let Err(e) = merged {
                        // Already recorded by the subtask.
                        debug!(user = %follow_id, error = %e, "profile merge failed");
                    }
                }
                Ok::<_, Error>(summary.items_copied)
            })
            .await;

        Ok(copied.unwrap_or(0))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Publishing
    // ─────────────────────────────────────────────────────────────────────────

    /// Copy `user`'s items and attachments from the local server to
    /// `server`, or to every server in the user's profile.
    ///
    /// A server that fails is skipped with a warning; the others still get
    /// the user's items.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NoProfile`] if the user has no local profile
    /// - [`SyncError::NoSyncSources`] if there is nowhere to publish to
    /// - Client errors while listing the user's local items
    pub async fn publish_my_posts(
        &self,
        tracker: &TaskTracker,
        user: &UserId,
        server: Option<&str>,
    ) -> Result<PublishSummary> {
        let local = &self.local;
        let Some(my_profile) = local.get_profile(user).await? else {
            return Err(SyncError::NoProfile(*user).into());
        };

        let servers = match server {
            Some(server) => vec![server.to_string()],
            None => servers_from_profile(&my_profile.profile, tracker),
        };
        if servers.is_empty() {
            return Err(SyncError::NoSyncSources.into());
        }
        let dests: Vec<Client> = servers
            .iter()
            .map(|url| local.for_server(url.as_str()))
            .collect();

        let mut local_items: Vec<(Signature, ItemType)> = Vec::new();
        let mut listing = local.user_items(user);
        while let Some(entry) = listing.try_next().await? {
            match entry.signature() {
                Ok(signature) => local_items.push((signature, entry.item_type)),
                Err(e) => tracker.warn(format!("Skipping malformed local entry: {e}")),
            }
        }

        let mut summary = PublishSummary {
            servers: dests.len(),
            ..PublishSummary::default()
        };
        let items = local_items.as_slice();
        let dests = dests.as_slice();

        let (copied, failed) = tracker
            .run_subtask("Syncing Items", |tracker| async move {
                let (mut copied, mut failed) = (0, 0);
                for dest in dests {
                    let result = tracker
                        .run_subtask(format!("Syncing to {}", dest.url()), |tracker| async move {
                            self.publish_items_to(&tracker, user, items, dest).await
                        })
                        .await;
                    match result {
                        Ok(count) => copied += count,
                        Err(_) => {
                            tracker.warn("Skipping this server");
                            failed += 1;
                        }
                    }
                }
                Ok::<_, Error>((copied, failed))
            })
            .await?;
        summary.items_copied = copied;
        summary.servers_failed = failed;

        summary.attachment_bytes_copied = tracker
            .run_subtask("Syncing file attachments", |tracker| async move {
                let mut bytes_copied = 0;
                for (signature, item_type) in items {
                    if !item_type.may_have_attachments() {
                        continue;
                    }
                    let item = match local
                        .get_item(user, signature, GetItemOptions::unverified())
                        .await
                    {
                        Ok(Some(item)) => item,
                        Ok(None) => {
                            tracker.error(format!(
                                "Couldn't fetch {signature} from the local server"
                            ));
                            continue;
                        }
                        Err(e) => {
                            tracker.error(format!(
                                "Error loading {signature} from the local server: {e}"
                            ));
                            continue;
                        }
                    };
                    for attachment in item.attachments() {
                        bytes_copied += send_attachment_multi(
                            &tracker,
                            user,
                            signature,
                            &attachment.name,
                            local,
                            dests,
                        )
                        .await;
                    }
                }
                tracker.log(format!("Copied {}", readable_size(bytes_copied)));
                Ok::<_, Error>(bytes_copied)
            })
            .await?;

        Ok(summary)
    }

    /// Copy the items in `items` that `dest` lacks. Stops at the first
    /// failed write.
    async fn publish_items_to(
        &self,
        tracker: &TaskTracker,
        user: &UserId,
        items: &[(Signature, ItemType)],
        dest: &Client,
    ) -> Result<usize> {
        let mut on_dest: HashSet<Signature> = HashSet::new();
        let mut listing = dest.user_items(user);
        while let Some(entry) = listing.try_next().await? {
            if let Ok(signature) = entry.signature() {
                on_dest.insert(signature);
            }
        }

        let tasks: Vec<CopyTask> = items
            .iter()
            .filter(|(signature, _)| !on_dest.contains(signature))
            .map(|(signature, _)| CopyTask {
                user_id: *user,
                signature: *signature,
                from: self.local.clone(),
                to: dest.clone(),
            })
            .collect();
        tracker.log(format!("{} items to copy", tasks.len()));

        let copy_tracker = tracker.clone();
        let mut results = prefetch(
            stream::iter(tasks),
            self.config.prefetch_concurrency,
            move |task| sync_user_item(task, copy_tracker.clone()),
        );

        let mut copied = 0;
        while let Some(result) = results.next().await {
            if let Some(e) = result.dest_error {
                return Err(e.into());
            }
            copied += result.items_copied;
        }
        tracker.log(format!("Copied {copied} items"));
        Ok(copied)
    }
}
