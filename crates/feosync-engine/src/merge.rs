//! Diff a user's listings across servers into copy tasks.
//!
//! Every server lists a user's items in the same total order: newest
//! timestamp first, ties broken by signature bytes, descending. That lets us
//! walk the local listing and every remote listing in lockstep, like the merge
//! step of a merge sort, and see what the local server is missing without
//! loading any listing in full.
//!
//! Algorithm, per step:
//! 1. Fill the head of every listing that has none
//! 2. Drop remotes that are exhausted or failed
//! 3. Pick the newest head of all as the candidate
//! 4. If local has it, pop it everywhere and count it
//! 5. Otherwise pop it from every remote that has it and copy from one of them

use std::cmp::Ordering;
use std::fmt;

use futures_util::future::join_all;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use feosync_client::{Client, ItemStream};
use feosync_core::{newest_first, ItemListEntry, Signature, UserId};

use crate::config::SyncOptions;
use crate::tracker::TaskTracker;

/// Copy one item from a server that has it to one that doesn't.
#[derive(Clone)]
pub struct CopyTask {
    pub user_id: UserId,
    pub signature: Signature,
    pub from: Client,
    pub to: Client,
}

impl fmt::Debug for CopyTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyTask")
            .field("user_id", &self.user_id)
            .field("signature", &self.signature)
            .field("from", &self.from.url())
            .field("to", &self.to.url())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Listing cursors
// ─────────────────────────────────────────────────────────────────────────────

/// A user's listing on one server, read one entry at a time.
pub(crate) struct ListingCursor {
    client: Client,
    items: ItemStream,
    head: Option<ItemListEntry>,
    previous: Option<ItemListEntry>,
    done: bool,
    had_error: bool,
}

impl ListingCursor {
    pub(crate) fn new(client: Client, user: &UserId) -> Self {
        let items = client.user_items(user);
        Self {
            client,
            items,
            head: None,
            previous: None,
            done: false,
            had_error: false,
        }
    }

    /// Load the next entry into the head, unless there already is one.
    ///
    /// A listing error is reported and ends this cursor. It is never returned.
    pub(crate) async fn fetch_next(&mut self, tracker: &TaskTracker) {
        if self.head.is_some() || self.done {
            return;
        }

        match self.items.next().await {
            Some(Ok(entry)) => {
                self.warn_out_of_order(&entry);
                self.head = Some(entry);
            }
            Some(Err(e)) => {
                tracker.warn(format!(
                    "Error reading from {}. Skipping server. ({e})",
                    self.client.url()
                ));
                self.done = true;
                self.had_error = true;
            }
            None => self.done = true,
        }
    }

    pub(crate) fn head(&self) -> Option<&ItemListEntry> {
        self.head.as_ref()
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    pub(crate) fn had_error(&self) -> bool {
        self.had_error
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    /// Pop the head if it is at the same position as `entry`.
    pub(crate) fn pop_if_equals(&mut self, entry: &ItemListEntry) -> bool {
        match &self.head {
            Some(head) if head.same_position(entry) => {
                self.previous = self.head.take();
                true
            }
            _ => false,
        }
    }

    fn warn_out_of_order(&self, current: &ItemListEntry) {
        let Some(previous) = &self.previous else {
            return;
        };
        if newest_first(previous, current) == Ordering::Less {
            return;
        }

        warn!(
            server = self.client.url(),
            "Server returned items out of order. This may lead to unnecessary work during sync."
        );
        debug!(
            timestamp = previous.timestamp_ms_utc,
            signature = %hex::encode(&previous.signature),
            "newer entry"
        );
        debug!(
            timestamp = current.timestamp_ms_utc,
            signature = %hex::encode(&current.signature),
            "older entry"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Missing items
// ─────────────────────────────────────────────────────────────────────────────

/// Finds items that remote servers have and the local server lacks.
///
/// Produces [`CopyTask`]s newest first, never the same item twice, and only
/// for entries some remote actually listed.
pub struct MissingItems {
    tracker: TaskTracker,
    user: UserId,
    local: ListingCursor,
    remotes: Vec<ListingCursor>,
    limit: usize,
    cutoff: Option<i64>,
    items_on_local: usize,
    already_have: usize,
    finished: bool,
}

impl MissingItems {
    pub fn new(
        tracker: &TaskTracker,
        local: &Client,
        user: &UserId,
        remotes: Vec<Client>,
        options: &SyncOptions,
    ) -> Self {
        Self {
            tracker: tracker.clone(),
            user: *user,
            local: ListingCursor::new(local.clone(), user),
            remotes: remotes
                .into_iter()
                .map(|client| ListingCursor::new(client, user))
                .collect(),
            limit: options.recent_items.unwrap_or(usize::MAX),
            cutoff: options.to_date_utc_ms,
            items_on_local: 0,
            already_have: 0,
            finished: false,
        }
    }

    /// Items found to already be on the local server.
    pub fn already_have(&self) -> usize {
        self.already_have
    }

    /// Items on the local server so far, counting those being copied.
    pub fn on_local(&self) -> usize {
        self.items_on_local
    }

    /// The next item to copy, or `None` when there is nothing more to do.
    pub async fn next_task(&mut self) -> Option<CopyTask> {
        while !self.finished {
            if self.local.had_error() || self.items_on_local >= self.limit {
                break;
            }

            let tracker = &self.tracker;
            futures_util::future::join(
                self.local.fetch_next(tracker),
                join_all(self.remotes.iter_mut().map(|r| r.fetch_next(tracker))),
            )
            .await;
            if self.local.had_error() {
                break;
            }

            self.remotes.retain(|r| !r.is_done());
            if self.remotes.is_empty() {
                break;
            }

            let candidate = std::iter::once(self.local.head())
                .chain(self.remotes.iter().map(ListingCursor::head))
                .flatten()
                .min_by(|a, b| newest_first(a, b))
                .cloned();
            let Some(candidate) = candidate else {
                break;
            };

            if self.cutoff.is_some_and(|cutoff| candidate.timestamp_ms_utc < cutoff) {
                break;
            }

            if self.local.pop_if_equals(&candidate) {
                for remote in &mut self.remotes {
                    remote.pop_if_equals(&candidate);
                }
                self.already_have += 1;
                self.items_on_local += 1;
                continue;
            }

            let choices: Vec<usize> = self
                .remotes
                .iter_mut()
                .enumerate()
                .filter_map(|(i, remote)| remote.pop_if_equals(&candidate).then_some(i))
                .collect();
            let Some(choice) = pick_random(&choices) else {
                continue;
            };
            let from = self.remotes[choice].client().clone();

            let signature = match candidate.signature() {
                Ok(signature) => signature,
                Err(e) => {
                    self.tracker
                        .warn(format!("Bad signature from server {}: {e}", from.url()));
                    continue;
                }
            };

            // Counted as if the copy succeeds.
            self.items_on_local += 1;
            return Some(CopyTask {
                user_id: self.user,
                signature,
                from,
                to: self.local.client().clone(),
            });
        }

        self.finished = true;
        None
    }

    /// Turn this into a stream of copy tasks.
    pub fn into_stream(self) -> BoxStream<'static, CopyTask> {
        stream::unfold(self, |mut missing| async move {
            let task = missing.next_task().await?;
            Some((task, missing))
        })
        .boxed()
    }
}

/// Uniform choice; any server that listed the item will do.
fn pick_random(choices: &[usize]) -> Option<usize> {
    choices.choose(&mut rand::thread_rng()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use feosync_testkit::generators::item_layouts;
    use feosync_testkit::{TestNetwork, TestUser};
    use futures_util::StreamExt;
    use proptest::prelude::*;

    const X: &str = "https://x.example";
    const Y: &str = "https://y.example";
    const Z: &str = "https://z.example";

    async fn collect(missing: MissingItems) -> Vec<CopyTask> {
        missing.into_stream().collect().await
    }

    #[tokio::test]
    async fn test_copies_newest_first_from_the_server_that_has_it() {
        let net = TestNetwork::new();
        let user = TestUser::new();
        let s1 = user.post(100);
        let s2 = user.post(90);
        s1.store_on(&net.server(X));
        s2.store_on(&net.server(Y));

        let tracker = TaskTracker::new();
        let options = SyncOptions {
            recent_items: Some(10),
            ..SyncOptions::default()
        };
        let missing = MissingItems::new(
            &tracker,
            &net.local_client(),
            &user.user_id(),
            vec![net.client(X), net.client(Y)],
            &options,
        );

        let tasks = collect(missing).await;
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].signature, s1.signature);
        assert_eq!(tasks[0].from.base_url(), X);
        assert_eq!(tasks[1].signature, s2.signature);
        assert_eq!(tasks[1].from.base_url(), Y);
        assert_eq!(tasks[0].to.base_url(), "");
    }

    #[tokio::test]
    async fn test_skips_items_already_local() {
        let net = TestNetwork::new();
        let user = TestUser::new();
        let s1 = user.post(100);
        let s2 = user.post(90);
        s1.store_on(&net.local_server());
        s1.store_on(&net.server(X));
        s2.store_on(&net.server(X));

        let tracker = TaskTracker::new();
        let mut missing = MissingItems::new(
            &tracker,
            &net.local_client(),
            &user.user_id(),
            vec![net.client(X)],
            &SyncOptions::default(),
        );

        let task = missing.next_task().await.unwrap();
        assert_eq!(task.signature, s2.signature);
        assert!(missing.next_task().await.is_none());
        assert_eq!(missing.already_have(), 1);
        assert_eq!(missing.on_local(), 2);
    }

    #[tokio::test]
    async fn test_failing_remote_is_skipped() {
        let net = TestNetwork::new();
        let user = TestUser::new();
        let a = user.post(30);
        let b = user.post(20);
        a.store_on(&net.server(X));
        b.store_on(&net.server(Y));
        a.store_on(&net.server(Z));
        net.server(Z).set_fail_listings(true);

        let tracker = TaskTracker::new();
        let missing = MissingItems::new(
            &tracker,
            &net.local_client(),
            &user.user_id(),
            vec![net.client(X), net.client(Y), net.client(Z)],
            &SyncOptions::default(),
        );

        let tasks = collect(missing).await;
        let sigs: Vec<_> = tasks.iter().map(|t| t.signature).collect();
        assert_eq!(sigs, vec![a.signature, b.signature]);
        assert_eq!(tasks[0].from.base_url(), X);
        assert_eq!(tracker.warn_count(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_remote_is_skipped() {
        let net = TestNetwork::new();
        let user = TestUser::new();
        let a = user.post(30);
        a.store_on(&net.server(X));

        let tracker = TaskTracker::new();
        let missing = MissingItems::new(
            &tracker,
            &net.local_client(),
            &user.user_id(),
            vec![net.client("https://nowhere.example"), net.client(X)],
            &SyncOptions::default(),
        );

        let tasks = collect(missing).await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tracker.warn_count(), 1);
    }

    #[tokio::test]
    async fn test_local_error_stops_the_merge() {
        let net = TestNetwork::new();
        let user = TestUser::new();
        user.post(30).store_on(&net.server(X));
        net.local_server().set_fail_listings(true);

        let tracker = TaskTracker::new();
        let missing = MissingItems::new(
            &tracker,
            &net.local_client(),
            &user.user_id(),
            vec![net.client(X)],
            &SyncOptions::default(),
        );

        assert!(collect(missing).await.is_empty());
    }

    #[tokio::test]
    async fn test_recent_items_limit_counts_local_items() {
        let net = TestNetwork::new();
        let user = TestUser::new();
        let x = net.server(X);
        let posts: Vec<_> = (1..=10).map(|ts| user.post(ts)).collect();
        for post in &posts {
            post.store_on(&x);
        }
        posts[9].store_on(&net.local_server());

        let tracker = TaskTracker::new();
        let options = SyncOptions {
            recent_items: Some(4),
            ..SyncOptions::default()
        };
        let missing = MissingItems::new(
            &tracker,
            &net.local_client(),
            &user.user_id(),
            vec![net.client(X)],
            &options,
        );

        // The newest is already local; three more make four.
        let sigs: Vec<_> = collect(missing).await.iter().map(|t| t.signature).collect();
        assert_eq!(
            sigs,
            vec![posts[8].signature, posts[7].signature, posts[6].signature]
        );
    }

    #[tokio::test]
    async fn test_stops_at_cutoff() {
        let net = TestNetwork::new();
        let user = TestUser::new();
        let x = net.server(X);
        let posts: Vec<_> = (1..=5).map(|ts| user.post(ts * 10)).collect();
        for post in &posts {
            post.store_on(&x);
        }

        let tracker = TaskTracker::new();
        let options = SyncOptions {
            to_date_utc_ms: Some(30),
            ..SyncOptions::default()
        };
        let missing = MissingItems::new(
            &tracker,
            &net.local_client(),
            &user.user_id(),
            vec![net.client(X)],
            &options,
        );

        let sigs: Vec<_> = collect(missing).await.iter().map(|t| t.signature).collect();
        assert_eq!(sigs, vec![posts[4].signature, posts[3].signature, posts[2].signature]);
    }

    #[tokio::test]
    async fn test_small_pages_and_shared_items() {
        let net = TestNetwork::new();
        let user = TestUser::new();
        let (x, y) = (net.server(X), net.server(Y));
        x.set_page_size(2);
        y.set_page_size(3);
        let posts: Vec<_> = (1..=9).map(|ts| user.post(ts)).collect();
        for (i, post) in posts.iter().enumerate() {
            if i % 2 == 0 {
                post.store_on(&x);
            }
            if i % 3 != 1 {
                post.store_on(&y);
            }
        }

        let tracker = TaskTracker::new();
        let missing = MissingItems::new(
            &tracker,
            &net.local_client(),
            &user.user_id(),
            vec![net.client(X), net.client(Y)],
            &SyncOptions::default(),
        );

        let tasks = collect(missing).await;
        let expected: Vec<_> = posts
            .iter()
            .enumerate()
            .rev()
            .filter(|(i, _)| i % 2 == 0 || i % 3 != 1)
            .map(|(_, post)| post.signature)
            .collect();
        let sigs: Vec<_> = tasks.iter().map(|t| t.signature).collect();
        assert_eq!(sigs, expected);
        for task in &tasks {
            let server = net.network.server(task.from.base_url()).unwrap();
            assert!(server.has_item(&task.user_id, &task.signature));
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_copy_plan_is_exactly_what_is_missing(layouts in item_layouts(3, 12)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            let net = TestNetwork::new();
            let user = TestUser::from_seed(7);
            let remotes = [X, Y, Z];
            let local = net.local_server();

            let mut on_local = HashSet::new();
            let mut on_remote = HashSet::new();
            for (i, layout) in layouts.iter().enumerate() {
                let item = user.post_with_body(layout.timestamp_ms_utc, &format!("item {i}"));
                if layout.on_local {
                    item.store_on(&local);
                    on_local.insert(item.signature);
                }
                for (url, present) in remotes.iter().zip(&layout.on_remotes) {
                    if *present {
                        item.store_on(&net.server(url));
                        on_remote.insert(item.signature);
                    }
                }
            }

            let clients = remotes.iter().map(|url| net.client(url)).collect();
            let tracker = TaskTracker::new();
            let missing = MissingItems::new(
                &tracker,
                &net.local_client(),
                &user.user_id(),
                clients,
                &SyncOptions::default(),
            );
            let tasks = rt.block_on(collect(missing));

            let emitted: Vec<Signature> = tasks.iter().map(|t| t.signature).collect();
            let unique: HashSet<Signature> = emitted.iter().copied().collect();
            prop_assert_eq!(unique.len(), emitted.len());

            let expected: HashSet<Signature> = on_remote.difference(&on_local).copied().collect();
            prop_assert_eq!(unique, expected);
            prop_assert_eq!(tracker.warn_count(), 0);
        }
    }
}
