//! Profiles as sync sources, and last-writer-wins profile merge.

use futures_util::future::join_all;

use feosync_client::{Client, ProfileResult};
use feosync_core::{validate_server_url, Profile, UserId};

use crate::error::Result;
use crate::tracker::TaskTracker;

/// The valid server URLs a profile declares, without duplicates.
///
/// Invalid URLs are reported on `tracker` and skipped.
pub fn servers_from_profile(profile: &Profile, tracker: &TaskTracker) -> Vec<String> {
    let mut servers: Vec<String> = Vec::new();
    for server in &profile.servers {
        if let Err(e) = validate_server_url(&server.url) {
            tracker.warn(format!("Skipping invalid server URL. {e}: {}", server.url));
            continue;
        }
        if !servers.contains(&server.url) {
            servers.push(server.url.clone());
        }
    }
    servers
}

/// `first` followed by whatever of `second` it lacks.
pub fn union_servers(first: &[String], second: &[String]) -> Vec<String> {
    let mut out = first.to_vec();
    for url in second {
        if !out.contains(url) {
            out.push(url.clone());
        }
    }
    out
}

/// Copy the newest known profile of `user` to the local server.
///
/// `local_profile` is what the local server currently serves. A remote that
/// fails is treated as having no profile. Returns whether a profile was
/// written.
///
/// "Newest" is the greatest `(timestamp, signature)`. Timestamps are chosen
/// by the author and are not authenticated, so an author can make any of
/// their profiles win by dating it in the future.
pub async fn sync_user_profile(
    tracker: &TaskTracker,
    local: &Client,
    user: &UserId,
    local_profile: Option<&ProfileResult>,
    remotes: &[Client],
) -> Result<bool> {
    let fetches = remotes.iter().map(|remote| async move {
        match remote.get_profile(user).await {
            Ok(profile) => profile,
            Err(e) => {
                tracker.warn(format!(
                    "Error fetching profile from remote {}: {e}",
                    remote.url()
                ));
                None
            }
        }
    });
    let remote_profiles: Vec<ProfileResult> =
        join_all(fetches).await.into_iter().flatten().collect();

    if remote_profiles.is_empty() {
        tracker.warn("No profile found.");
        return Ok(false);
    }

    let newest = local_profile
        .into_iter()
        .chain(remote_profiles.iter())
        .max_by(|a, b| {
            (a.timestamp_ms_utc, a.signature.as_bytes())
                .cmp(&(b.timestamp_ms_utc, b.signature.as_bytes()))
        });
    let Some(newest) = newest else {
        return Ok(false);
    };

    if local_profile.is_some_and(|current| current.signature == newest.signature) {
        return Ok(false);
    }

    local
        .put_item(user, &newest.signature, newest.bytes.clone())
        .await?;
    tracker.log(format!("Updated profile from {}", newest.timestamp_ms_utc));
    Ok(true)
}
