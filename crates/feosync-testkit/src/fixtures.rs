//! Test fixtures and helpers.
//!
//! Common setup code for sync tests: users that sign items, and a network of
//! in-memory servers with clients pointed at them.

use std::sync::Arc;

use bytes::Bytes;

use feosync_client::{Client, ClientConfig, MemoryNetwork, MemoryServer};
use feosync_core::{
    Attachment, CborCodec, Comment, Follow, Item, ItemCodec, ItemKind, ItemListEntry, Post,
    PrivateKey, Profile, ReplyRef, Server, Signature, UserId,
};

/// Base URL of the "local" server. An empty base URL means requests go to
/// paths like `/u/...`, the way a browser client talks to its own origin.
pub const LOCAL: &str = "";

/// A user with a signing key.
pub struct TestUser {
    key: PrivateKey,
}

/// An item together with its signature and the exact signed bytes.
#[derive(Debug, Clone)]
pub struct SignedItem {
    pub user_id: UserId,
    pub signature: Signature,
    pub bytes: Bytes,
    pub item: Item,
}

impl TestUser {
    /// Create a user with a random key.
    pub fn new() -> Self {
        Self {
            key: PrivateKey::generate(),
        }
    }

    /// Create a user with a deterministic key.
    pub fn from_seed(seed: u8) -> Self {
        Self {
            key: PrivateKey::from_seed(&[seed; 32]),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.key.user_id()
    }

    pub fn key(&self) -> &PrivateKey {
        &self.key
    }

    /// Encode and sign an item.
    pub fn sign(&self, item: Item) -> SignedItem {
        let bytes = Bytes::from(
            CborCodec
                .encode_item(&item)
                .expect("test items always encode"),
        );
        SignedItem {
            user_id: self.user_id(),
            signature: self.key.sign(&bytes),
            bytes,
            item,
        }
    }

    /// A post with no attachments. The body includes the timestamp so
    /// posts at different times have different signatures.
    pub fn post(&self, timestamp_ms_utc: i64) -> SignedItem {
        self.sign(Item::new(
            timestamp_ms_utc,
            ItemKind::Post(Post {
                title: format!("Post at {timestamp_ms_utc}"),
                body: format!("Hello from {timestamp_ms_utc}"),
                attachments: Vec::new(),
            }),
        ))
    }

    /// A post with a text body.
    pub fn post_with_body(&self, timestamp_ms_utc: i64, body: &str) -> SignedItem {
        self.sign(Item::new(
            timestamp_ms_utc,
            ItemKind::Post(Post {
                title: String::new(),
                body: body.to_string(),
                attachments: Vec::new(),
            }),
        ))
    }

    /// A post declaring attachments as `(name, size)` pairs.
    pub fn post_with_files(&self, timestamp_ms_utc: i64, files: &[(&str, u64)]) -> SignedItem {
        self.sign(Item::new(
            timestamp_ms_utc,
            ItemKind::Post(Post {
                title: "files".into(),
                body: format!("Files at {timestamp_ms_utc}"),
                attachments: files
                    .iter()
                    .map(|(name, size)| Attachment {
                        name: name.to_string(),
                        size: *size,
                    })
                    .collect(),
            }),
        ))
    }

    /// A profile declaring `servers` and following `follows`.
    pub fn profile(
        &self,
        timestamp_ms_utc: i64,
        servers: &[&str],
        follows: &[UserId],
    ) -> SignedItem {
        self.sign(Item::new(
            timestamp_ms_utc,
            ItemKind::Profile(Profile {
                display_name: format!("user {}", &self.user_id().to_base58()[..6]),
                about: String::new(),
                servers: servers.iter().map(|url| Server::new(*url)).collect(),
                follows: follows
                    .iter()
                    .enumerate()
                    .map(|(i, user)| Follow::new(user, format!("follow {i}")))
                    .collect(),
            }),
        ))
    }

    /// A comment replying to `parent`.
    pub fn comment(&self, timestamp_ms_utc: i64, parent: &SignedItem, text: &str) -> SignedItem {
        self.sign(Item::new(
            timestamp_ms_utc,
            ItemKind::Comment(Comment {
                reply_to: ReplyRef::new(
                    &parent.user_id,
                    &parent.signature,
                    parent.item.item_type(),
                ),
                text: text.to_string(),
            }),
        ))
    }
}

impl Default for TestUser {
    fn default() -> Self {
        Self::new()
    }
}

impl SignedItem {
    /// The listing entry a server would advertise for this item.
    pub fn entry(&self) -> ItemListEntry {
        ItemListEntry::new(
            &self.user_id,
            &self.signature,
            self.item.timestamp_ms_utc,
            self.item.item_type(),
        )
    }

    /// Store this item on `server`.
    pub fn store_on(&self, server: &MemoryServer) {
        server
            .put_item_direct(&self.user_id, &self.signature, self.bytes.clone())
            .expect("test server accepts signed items");
    }

    /// Store an attachment of this item on `server`.
    pub fn store_file_on(&self, server: &MemoryServer, name: &str, contents: &[u8]) {
        server
            .put_attachment_direct(
                &self.user_id,
                &self.signature,
                name,
                Bytes::copy_from_slice(contents),
            )
            .expect("test server accepts declared attachments");
    }
}

/// An in-memory network of servers.
pub struct TestNetwork {
    pub network: Arc<MemoryNetwork>,
    pub config: ClientConfig,
}

impl TestNetwork {
    pub fn new() -> Self {
        Self {
            network: MemoryNetwork::new(),
            config: ClientConfig::default(),
        }
    }

    /// The server at `base_url`, started on first use.
    pub fn server(&self, base_url: &str) -> Arc<MemoryServer> {
        self.network.add_server(base_url)
    }

    /// The local server.
    pub fn local_server(&self) -> Arc<MemoryServer> {
        self.server(LOCAL)
    }

    /// A client for `base_url`. Does not start a server there.
    pub fn client(&self, base_url: &str) -> Client {
        Client::new(
            base_url,
            self.network.clone(),
            Arc::new(CborCodec),
            self.config,
        )
    }

    /// A client for the local server, starting it if needed.
    pub fn local_client(&self) -> Client {
        self.local_server();
        self.client(LOCAL)
    }
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}
