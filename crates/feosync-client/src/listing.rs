//! Paginated listings as streams.
//!
//! Servers return listings one page at a time, newest first. These helpers
//! walk the pages and yield entries one by one, fetching the next page only
//! when the previous one is used up.

use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};

use feosync_core::{ItemListEntry, Signature, UserId};

use crate::client::Client;
use crate::error::{ClientError, Result};

/// Which listing endpoint to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingKind {
    /// Everything a user posted: `/u/{user}/{format}`.
    UserItems(UserId),
    /// A user's items plus those of everyone they follow: `/u/{user}/feed/{format}`.
    Feed(UserId),
    /// `/homepage/{format}`.
    Homepage,
    /// Comments replying to an item: `/u/{user}/i/{sig}/replies/{format}`.
    Replies(UserId, Signature),
}

impl ListingKind {
    fn path(&self, format: &str) -> String {
        match self {
            Self::UserItems(user) => format!("/u/{user}/{format}"),
            Self::Feed(user) => format!("/u/{user}/feed/{format}"),
            Self::Homepage => format!("/homepage/{format}"),
            Self::Replies(user, sig) => format!("/u/{user}/i/{sig}/replies/{format}"),
        }
    }
}

/// Where to start reading a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingOffset {
    /// Entries strictly older than this timestamp, newest first.
    Before(i64),
    /// Entries strictly newer than this timestamp, oldest first.
    After(i64),
}

impl ListingOffset {
    pub(crate) fn query(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        match self {
            Self::Before(ts) => query.append_pair("before", &ts.to_string()),
            Self::After(ts) => query.append_pair("after", &ts.to_string()),
        };
        query.finish()
    }

    fn is_forward(&self) -> bool {
        matches!(self, Self::After(_))
    }

    fn advance(&self, timestamp_ms_utc: i64) -> Self {
        match self {
            Self::Before(_) => Self::Before(timestamp_ms_utc),
            Self::After(_) => Self::After(timestamp_ms_utc),
        }
    }
}

/// A lazily paginated listing.
pub type ItemStream = BoxStream<'static, Result<ItemListEntry>>;

struct Pager {
    client: Client,
    path: String,
    offset: Option<ListingOffset>,
    done: bool,
}

impl Client {
    /// Stream a listing from the newest entry (or from `offset`).
    ///
    /// The stream ends when the server reports no more items or returns an
    /// empty page. A page error is yielded once and ends the stream. With
    /// [`ListingOffset::After`] entries come oldest first.
    pub fn stream_items(&self, kind: ListingKind, offset: Option<ListingOffset>) -> ItemStream {
        let pager = Pager {
            client: self.clone(),
            path: kind.path(self.codec().format()),
            offset,
            done: false,
        };

        let pages = stream::try_unfold(pager, |mut pager| async move {
            if pager.done {
                return Ok::<_, ClientError>(None);
            }

            let mut list = pager.client.get_item_list(&pager.path, pager.offset).await?;
            let forward = pager.offset.as_ref().is_some_and(ListingOffset::is_forward);
            if forward {
                // Pages are always newest-first.
                list.items.reverse();
            }

            let Some(last) = list.items.last() else {
                return Ok(None);
            };
            let next = match pager.offset {
                Some(offset) => offset.advance(last.timestamp_ms_utc),
                None => ListingOffset::Before(last.timestamp_ms_utc),
            };
            pager.offset = Some(next);
            pager.done = list.no_more_items;
            Ok(Some((list.items, pager)))
        });

        pages
            .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, ClientError>)))
            .try_flatten()
            .boxed()
    }

    /// Everything `user` has posted to this server, newest first.
    pub fn user_items(&self, user: &UserId) -> ItemStream {
        self.stream_items(ListingKind::UserItems(*user), None)
    }

    pub fn feed_items(&self, user: &UserId, offset: Option<ListingOffset>) -> ItemStream {
        self.stream_items(ListingKind::Feed(*user), offset)
    }

    pub fn homepage_items(&self, offset: Option<ListingOffset>) -> ItemStream {
        self.stream_items(ListingKind::Homepage, offset)
    }

    pub fn reply_items(&self, user: &UserId, signature: &Signature) -> ItemStream {
        self.stream_items(ListingKind::Replies(*user, *signature), None)
    }
}
