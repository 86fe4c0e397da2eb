//! Decoded items.
//!
//! An item is a post, a profile or a comment. Feosync mostly treats items as
//! opaque signed bytes; the decoded form is only needed to find a user's
//! declared servers and follows, and the attachments a post references.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::entry::ItemType;
use crate::error::ValidationError;
use crate::identity::{Signature, UserId};

/// A decoded item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Author-claimed timestamp (Unix milliseconds). Untrusted.
    pub timestamp_ms_utc: i64,
    /// Author's UTC offset at the time of writing.
    pub utc_offset_minutes: i32,
    pub kind: ItemKind,
}

/// The payload of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Post(Post),
    Profile(Profile),
    Comment(Comment),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub title: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

/// A file attached to a post, stored at `/u/{user}/i/{sig}/files/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub display_name: String,
    pub about: String,
    /// Servers this user publishes to.
    pub servers: Vec<Server>,
    pub follows: Vec<Follow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub url: String,
}

/// A followed user. The user ID is raw bytes as written by the author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    pub user_id: Bytes,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub reply_to: ReplyRef,
    pub text: String,
}

/// Reference to the item a comment replies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub user_id: Bytes,
    pub signature: Bytes,
    pub item_type: ItemType,
}

impl Item {
    pub fn new(timestamp_ms_utc: i64, kind: ItemKind) -> Self {
        Self {
            timestamp_ms_utc,
            utc_offset_minutes: 0,
            kind,
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self.kind {
            ItemKind::Post(_) => ItemType::Post,
            ItemKind::Profile(_) => ItemType::Profile,
            ItemKind::Comment(_) => ItemType::Comment,
        }
    }

    pub fn is_profile(&self) -> bool {
        matches!(self.kind, ItemKind::Profile(_))
    }

    pub fn as_profile(&self) -> Option<&Profile> {
        match &self.kind {
            ItemKind::Profile(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn as_post(&self) -> Option<&Post> {
        match &self.kind {
            ItemKind::Post(post) => Some(post),
            _ => None,
        }
    }

    /// Attachments this item references. Only posts carry any.
    pub fn attachments(&self) -> &[Attachment] {
        match &self.kind {
            ItemKind::Post(post) => &post.attachments,
            _ => &[],
        }
    }

    /// Text content to search in: a post's body or a comment's text.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Post(post) => Some(&post.body),
            ItemKind::Comment(comment) => Some(&comment.text),
            ItemKind::Profile(_) => None,
        }
    }

    /// Structural checks a server applies before accepting an item.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timestamp_ms_utc == 0 {
            return Err(ValidationError::InvalidItem("timestamp is required"));
        }
        if let ItemKind::Profile(profile) = &self.kind {
            for follow in &profile.follows {
                follow.user_id()?;
            }
        }
        Ok(())
    }
}

impl Follow {
    pub fn new(user_id: &UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id: Bytes::copy_from_slice(user_id.as_bytes()),
            display_name: display_name.into(),
        }
    }

    pub fn user_id(&self) -> Result<UserId, ValidationError> {
        UserId::from_bytes(&self.user_id)
    }
}

impl Server {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl ReplyRef {
    pub fn new(user_id: &UserId, signature: &Signature, item_type: ItemType) -> Self {
        Self {
            user_id: Bytes::copy_from_slice(user_id.as_bytes()),
            signature: Bytes::copy_from_slice(signature.as_bytes()),
            item_type,
        }
    }
}

/// Check that `url` names a server root: `http(s)://host[:port]` with no
/// path, query, trailing slash or whitespace.
pub fn validate_server_url(url: &str) -> Result<(), ValidationError> {
    let invalid = |reason| ValidationError::InvalidServerUrl {
        url: url.to_string(),
        reason,
    };

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| invalid("must start with http:// or https://"))?;
    if rest.is_empty() {
        return Err(invalid("missing host"));
    }
    if rest.contains(|c: char| c == '/' || c.is_whitespace()) {
        return Err(invalid("must not contain a path or whitespace"));
    }

    let parsed = Url::parse(url).map_err(|_| invalid("unparseable"))?;
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(invalid("must not contain a query or fragment"));
    }
    Ok(())
}
