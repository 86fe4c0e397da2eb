//! File attachments: backfill into the local server and fan-out to others.
//!
//! Attachment failures are always soft. They are reported on the tracker and
//! the affected file is skipped; a later sync will find it missing again.

use futures_util::future::join_all;
use futures_util::StreamExt;

use feosync_client::{Client, ClientError, GetItemOptions};
use feosync_core::{readable_size, Profile, Signature, UserId};

use crate::error::{Result, SyncError};
use crate::profile::{servers_from_profile, union_servers};
use crate::tracker::TaskTracker;

/// Caps how many attachment bytes a backfill may copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachmentBudget {
    remaining: Option<u64>,
}

impl AttachmentBudget {
    /// `None` is unlimited; `Some(0)` copies nothing.
    pub fn new(max_bytes: Option<u64>) -> Self {
        Self {
            remaining: max_bytes,
        }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    pub fn spend(&mut self, bytes: u64) {
        if let Some(remaining) = &mut self.remaining {
            *remaining = remaining.saturating_sub(bytes);
        }
    }
}

/// Copy one attachment to `to` from the first of `sources` that has it.
///
/// Returns the number of bytes copied. Nothing is downloaded when `to`
/// already has the file or has no quota left for it.
pub async fn sync_attachment(
    tracker: &TaskTracker,
    user: &UserId,
    signature: &Signature,
    name: &str,
    to: &Client,
    sources: &[Client],
) -> u64 {
    let meta = match to.head_attachment(user, signature, name).await {
        Ok(meta) => meta,
        Err(e) => {
            tracker.warn(format!("Error checking {name} on {}: {e}", to.url()));
            return 0;
        }
    };
    if meta.exists {
        return 0;
    }

    let copied = tracker
        .run_subtask(format!("Syncing {name}"), |tracker| async move {
            tracker.log(format!("For item ID: {signature}"));
            if meta.exceeds_quota {
                tracker.warn("Copying would exceed the user's quota.");
                return Ok::<_, ClientError>(0);
            }

            let mut found = None;
            for from in sources {
                let download = tracker
                    .run_subtask(format!("Downloading from {}", from.url()), |tracker| async move {
                        let bytes = from.get_attachment(user, signature, name).await?;
                        if bytes.is_none() {
                            tracker.log("Not found");
                        }
                        Ok::<_, ClientError>(bytes)
                    })
                    .await;
                if let Ok(Some(bytes)) = download {
                    found = Some(bytes);
                    break;
                }
            }

            let Some(bytes) = found else {
                tracker.warn("Could not find file on any server.");
                return Ok(0);
            };

            let size = bytes.len() as u64;
            let upload = tracker
                .run_subtask(format!("Uploading to {}", to.url()), |tracker| async move {
                    to.put_attachment(user, signature, name, bytes).await?;
                    tracker.log("Success.");
                    Ok::<_, ClientError>(())
                })
                .await;
            if upload.is_err() {
                return Ok(0);
            }

            tracker.log(format!("Copied {}", readable_size(size)));
            Ok(size)
        })
        .await;

    copied.unwrap_or(0)
}

/// Send one local attachment to every destination that needs it.
///
/// All destinations are probed first. If none needs the file it is never
/// downloaded. Otherwise it is downloaded once and uploaded to the rest
/// concurrently; one destination failing does not affect the others.
/// Returns the total bytes uploaded.
pub async fn send_attachment_multi(
    tracker: &TaskTracker,
    user: &UserId,
    signature: &Signature,
    name: &str,
    from: &Client,
    dests: &[Client],
) -> u64 {
    let probes = join_all(
        dests
            .iter()
            .map(|dest| async move { (dest, dest.head_attachment(user, signature, name).await) }),
    )
    .await;

    let mut needed = Vec::new();
    for (dest, meta) in probes {
        match meta {
            Err(e) => tracker.error(format!("Error from {}: {e}", dest.url())),
            Ok(meta) if meta.exists => {}
            Ok(meta) if meta.exceeds_quota => {
                tracker.warn(format!("Sending to {} would exceed quota.", dest.url()));
            }
            Ok(_) => needed.push(dest),
        }
    }

    if needed.is_empty() {
        return 0;
    }

    let sent = tracker
        .run_subtask(format!("Syncing {name}"), |tracker| async move {
            tracker.log(format!("For item {signature}"));

            let download = tracker
                .run_subtask(format!("Loading {name} from {}", from.url()), |_| async move {
                    from.get_attachment(user, signature, name).await
                })
                .await;
            let bytes = match download {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    tracker.warn(format!("{name} is missing from {}", from.url()));
                    return Ok::<_, ClientError>(0);
                }
                // Recorded by the subtask.
                Err(_) => return Ok(0),
            };
            let size = bytes.len() as u64;

            let uploads = needed.iter().map(|dest| {
                let bytes = bytes.clone();
                let tracker = &tracker;
                async move {
                    tracker
                        .run_subtask(format!("Sending to {}", dest.url()), |tracker| async move {
                            dest.put_attachment(user, signature, name, bytes).await?;
                            tracker.log(format!("Sent {}", readable_size(size)));
                            Ok::<_, ClientError>(size)
                        })
                        .await
                }
            });
            let total: u64 = join_all(uploads).await.into_iter().flatten().sum();

            tracker.log(format!("Copied {}", readable_size(total)));
            Ok(total)
        })
        .await;

    sent.unwrap_or(0)
}

/// Backfill the attachments of every item `user` has on `to`.
///
/// Stops early once `budget` is used up. Returns the bytes copied.
pub async fn sync_user_attachments(
    tracker: &TaskTracker,
    user: &UserId,
    sources: &[Client],
    to: &Client,
    budget: &mut AttachmentBudget,
) -> Result<u64> {
    let mut bytes_copied = 0;

    if sources.is_empty() {
        tracker.warn("No servers to sync for this user");
        return Ok(bytes_copied);
    }

    let mut entries = to.user_items(user);
    'items: while let Some(entry) = entries.next().await {
        let entry = entry?;
        if !entry.item_type.may_have_attachments() {
            continue;
        }

        let signature = entry.signature()?;
        let item = to
            .get_item(user, &signature, GetItemOptions::unverified())
            .await?
            .ok_or_else(|| SyncError::TaskFailed(format!("Error fetching item {signature}")))?;

        for attachment in item.attachments() {
            if budget.is_exhausted() {
                tracker.log("Attachment byte budget used up.");
                break 'items;
            }
            let copied =
                sync_attachment(tracker, user, &signature, &attachment.name, to, sources).await;
            budget.spend(copied);
            bytes_copied += copied;
        }
    }

    tracker.log(format!("Copied: {}", readable_size(bytes_copied)));
    Ok(bytes_copied)
}

/// Backfill attachments for `user` and everyone their profile follows.
///
/// Files are looked for on `source_server` if given, otherwise on the user's
/// declared servers plus each follow's declared servers. Returns the bytes
/// copied.
pub async fn sync_feed_attachments(
    tracker: &TaskTracker,
    user: &UserId,
    profile: Option<&Profile>,
    source_server: Option<&str>,
    to: &Client,
    budget: &mut AttachmentBudget,
) -> u64 {
    let mut bytes_copied = 0;

    let my_servers = match (source_server, profile) {
        (Some(server), _) => vec![server.to_string()],
        (None, Some(profile)) => servers_from_profile(profile, tracker),
        (None, None) => Vec::new(),
    };
    let display_name = profile.map_or("", |p| p.display_name.as_str());

    if my_servers.is_empty() {
        tracker.warn("No servers specified for current user. Can't sync user's files.");
    } else {
        let sources = clients_for(to, &my_servers);
        let user_budget = &mut *budget;
        let copied = tracker
            .run_subtask(format!("User \"{display_name}\""), |tracker| async move {
                tracker.log(format!("User ID: {user}"));
                sync_user_attachments(&tracker, user, &sources, to, user_budget).await
            })
            .await;
        bytes_copied += copied.unwrap_or(0);
    }

    let follows = profile.map_or(&[][..], |p| p.follows.as_slice());
    for follow in follows {
        if budget.is_exhausted() {
            break;
        }
        let follow_id = match follow.user_id() {
            Ok(id) => id,
            Err(e) => {
                tracker.warn(format!("Skipping follow \"{}\": {e}", follow.display_name));
                continue;
            }
        };

        let mut follow_servers = my_servers.clone();
        if source_server.is_none() {
            // Our own servers first, to lessen load on others.
            match to.get_profile(&follow_id).await {
                Ok(Some(result)) => {
                    let declared = servers_from_profile(&result.profile, tracker);
                    follow_servers = union_servers(&my_servers, &declared);
                }
                Ok(None) => {}
                Err(e) => tracker.warn(format!("Error loading profile for {follow_id}: {e}")),
            }
        }

        let sources = clients_for(to, &follow_servers);
        let follow_budget = &mut *budget;
        let copied = tracker
            .run_subtask(format!("User \"{}\"", follow.display_name), |tracker| async move {
                tracker.log(format!("User ID: {follow_id}"));
                sync_user_attachments(&tracker, &follow_id, &sources, to, follow_budget).await
            })
            .await;
        // A failure was recorded by the subtask.
        bytes_copied += copied.unwrap_or(0);
    }

    tracker.log(format!("Copied {}", readable_size(bytes_copied)));
    bytes_copied
}

fn clients_for(base: &Client, servers: &[String]) -> Vec<Client> {
    servers.iter().map(|url| base.for_server(url.as_str())).collect()
}
