//! The protocol client: one instance per server.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::form_urlencoded;

use feosync_core::{Item, ItemCodec, ItemKind, ItemList, Profile, Signature, UserId};

use crate::error::{ClientError, Result};
use crate::fetch::{Fetch, FetchRequest, FetchResponse};
use crate::listing::ListingOffset;

/// Response header carrying the signature of a profile.
pub const SIGNATURE_HEADER: &str = "signature";

/// Response header set to `1` when an attachment upload would exceed quota.
pub const QUOTA_EXCEEDED_HEADER: &str = "x-fb-quota-exceeded";

/// Client tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Largest item body the client will accept.
    pub max_item_bytes: u64,
    /// Attachments above this size get a HEAD before the PUT.
    pub small_file_threshold: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_item_bytes: 1024 * 1024,
            small_file_threshold: 128 * 1024,
        }
    }
}

/// Options for [`Client::get_item_bytes`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GetItemOptions {
    /// Don't verify the signature. Only safe when the bytes are about to be
    /// written to a server that verifies them itself.
    pub skip_signature_check: bool,
}

impl GetItemOptions {
    pub fn unverified() -> Self {
        Self {
            skip_signature_check: true,
        }
    }
}

/// A verified profile as served by `/u/{user}/profile/{format}`.
#[derive(Debug, Clone)]
pub struct ProfileResult {
    pub timestamp_ms_utc: i64,
    pub profile: Profile,
    pub signature: Signature,
    /// The signed bytes, suitable for copying to another server.
    pub bytes: Bytes,
}

/// Result of an attachment HEAD probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachmentMeta {
    pub exists: bool,
    pub exceeds_quota: bool,
}

/// Talks to a single server.
///
/// Cheap to clone. Holds no state besides its base URL, so any number of
/// clients may be used concurrently.
#[derive(Clone)]
pub struct Client {
    base_url: String,
    fetch: Arc<dyn Fetch>,
    codec: Arc<dyn ItemCodec>,
    config: ClientConfig,
}

impl Client {
    /// Create a client for `base_url`, e.g. `https://blog.example.com`.
    pub fn new(
        base_url: impl Into<String>,
        fetch: Arc<dyn Fetch>,
        codec: Arc<dyn ItemCodec>,
        config: ClientConfig,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            fetch,
            codec,
            config,
        }
    }

    /// A client for another server sharing this client's transport and codec.
    pub fn for_server(&self, base_url: impl Into<String>) -> Self {
        Self::new(
            base_url,
            self.fetch.clone(),
            self.codec.clone(),
            self.config,
        )
    }

    /// Human-readable name of this server.
    pub fn url(&self) -> &str {
        if self.base_url.is_empty() {
            "local server"
        } else {
            &self.base_url
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn codec(&self) -> &dyn ItemCodec {
        self.codec.as_ref()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn item_url(&self, user: &UserId, signature: &Signature) -> String {
        format!(
            "{}/u/{}/i/{}/{}",
            self.base_url,
            user,
            signature,
            self.codec.format()
        )
    }

    fn attachment_url(&self, user: &UserId, signature: &Signature, name: &str) -> String {
        format!(
            "{}/u/{}/i/{}/files/{}",
            self.base_url,
            user,
            signature,
            encode_path_segment(name)
        )
    }

    /// Fetch the raw bytes of an item. `Ok(None)` if the server doesn't have it.
    pub async fn get_item_bytes(
        &self,
        user: &UserId,
        signature: &Signature,
        options: GetItemOptions,
    ) -> Result<Option<Bytes>> {
        let url = self.item_url(user, signature);
        let response = self.fetch.fetch(FetchRequest::get(&url)).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let bytes = self.read_item_body(&url, response).await?;
        if !options.skip_signature_check && !signature.verify(user, &bytes) {
            return Err(ClientError::Verification { url });
        }
        Ok(Some(bytes))
    }

    /// Fetch and decode an item.
    pub async fn get_item(
        &self,
        user: &UserId,
        signature: &Signature,
        options: GetItemOptions,
    ) -> Result<Option<Item>> {
        match self.get_item_bytes(user, signature, options).await? {
            None => Ok(None),
            Some(bytes) => Ok(Some(self.codec.decode_item(&bytes)?)),
        }
    }

    /// Upload an item. The caller is responsible for `signature` matching
    /// `bytes`; the server verifies it.
    pub async fn put_item(&self, user: &UserId, signature: &Signature, bytes: Bytes) -> Result<()> {
        let url = self.item_url(user, signature);
        let response = self.fetch.fetch(FetchRequest::put(&url, bytes)).await?;
        if !response.status.is_success() {
            return Err(ClientError::Status {
                url,
                status: response.status,
            });
        }
        Ok(())
    }

    /// Fetch the newest profile this server knows for `user`.
    pub async fn get_profile(&self, user: &UserId) -> Result<Option<ProfileResult>> {
        let url = format!("{}/u/{}/profile/{}", self.base_url, user, self.codec.format());
        let response = self.fetch.fetch(FetchRequest::get(&url)).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let signature = match response.header(SIGNATURE_HEADER) {
            None | Some("") => {
                return Err(ClientError::MissingHeader {
                    url,
                    header: SIGNATURE_HEADER,
                })
            }
            Some(value) => Signature::from_base58(value).map_err(|e| {
                ClientError::InvalidHeader {
                    url: url.clone(),
                    header: SIGNATURE_HEADER,
                    reason: e.to_string(),
                }
            })?,
        };

        let bytes = self.read_item_body(&url, response).await?;
        if !signature.verify(user, &bytes) {
            return Err(ClientError::Verification { url });
        }

        let item = self.codec.decode_item(&bytes)?;
        let ItemKind::Profile(profile) = item.kind else {
            return Err(ClientError::NotAProfile { url });
        };

        Ok(Some(ProfileResult {
            timestamp_ms_utc: item.timestamp_ms_utc,
            profile,
            signature,
            bytes,
        }))
    }

    /// Probe an attachment's existence and quota state.
    pub async fn head_attachment(
        &self,
        user: &UserId,
        signature: &Signature,
        name: &str,
    ) -> Result<AttachmentMeta> {
        let url = self.attachment_url(user, signature, name);
        let response = self.fetch.fetch(FetchRequest::head(&url)).await?;

        let exists = match response.status {
            StatusCode::OK => true,
            StatusCode::NOT_FOUND => false,
            status => return Err(ClientError::Status { url, status }),
        };
        let exceeds_quota = response.header(QUOTA_EXCEEDED_HEADER) == Some("1");

        Ok(AttachmentMeta {
            exists,
            exceeds_quota,
        })
    }

    /// Download an attachment. `Ok(None)` if the server doesn't have it.
    pub async fn get_attachment(
        &self,
        user: &UserId,
        signature: &Signature,
        name: &str,
    ) -> Result<Option<Bytes>> {
        let url = self.attachment_url(user, signature, name);
        let response = self.fetch.fetch(FetchRequest::get(&url)).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status.is_success() {
            return Err(ClientError::Status {
                url,
                status: response.status,
            });
        }
        Ok(Some(response.bytes().await?))
    }

    /// Upload an attachment.
    ///
    /// Large files are probed first and skipped when already present. A failed
    /// upload counts as success if the file exists afterwards.
    pub async fn put_attachment(
        &self,
        user: &UserId,
        signature: &Signature,
        name: &str,
        bytes: Bytes,
    ) -> Result<()> {
        if bytes.len() as u64 > self.config.small_file_threshold {
            let meta = self.head_attachment(user, signature, name).await?;
            if meta.exists {
                return Ok(());
            }
        }

        let url = self.attachment_url(user, signature, name);
        let outcome = match self.fetch.fetch(FetchRequest::put(&url, bytes)).await {
            Ok(response) if response.status.is_success() => return Ok(()),
            Ok(response) => ClientError::Status {
                url,
                status: response.status,
            },
            Err(e) => e,
        };

        // Someone may have beaten us to the upload.
        match self.head_attachment(user, signature, name).await {
            Ok(meta) if meta.exists => {
                debug!(name, "attachment upload failed but it exists now");
                Ok(())
            }
            _ => Err(outcome),
        }
    }

    /// Fetch a single listing page from `path` (relative to the base URL).
    pub async fn get_item_list(
        &self,
        path: &str,
        offset: Option<ListingOffset>,
    ) -> Result<ItemList> {
        let mut url = format!("{}{}", self.base_url, path);
        if let Some(offset) = offset {
            url.push('?');
            url.push_str(&offset.query());
        }

        let response = self.fetch.fetch(FetchRequest::get(&url)).await?;
        if !response.status.is_success() {
            return Err(ClientError::Status {
                url,
                status: response.status,
            });
        }
        let bytes = response.bytes().await?;
        Ok(self.codec.decode_item_list(&bytes)?)
    }

    /// Check status and declared length, then buffer an item body.
    async fn read_item_body(&self, url: &str, response: FetchResponse) -> Result<Bytes> {
        if !response.status.is_success() {
            return Err(ClientError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }

        let length = response
            .content_length()
            .map_err(|reason| ClientError::InvalidHeader {
                url: url.to_string(),
                header: "content-length",
                reason,
            })?
            .ok_or_else(|| ClientError::MissingHeader {
                url: url.to_string(),
                header: "content-length",
            })?;
        self.check_length(url, length)?;

        let bytes = response.bytes().await?;
        // The declared length is only a hint.
        self.check_length(url, bytes.len() as u64)?;
        Ok(bytes)
    }

    fn check_length(&self, url: &str, length: u64) -> Result<()> {
        let max = self.config.max_item_bytes;
        if length > max {
            return Err(ClientError::TooLarge {
                url: url.to_string(),
                length,
                max,
            });
        }
        if length == 0 {
            return Err(ClientError::EmptyBody {
                url: url.to_string(),
            });
        }
        Ok(())
    }
}

/// Percent-encode `name` so it stays one path segment.
///
/// Everything but `A-Z a-z 0-9 * - . _` is escaped. A space becomes `%20`
/// rather than the form encoding's `+`, which is itself escaped as `%2B`.
pub fn encode_path_segment(name: &str) -> String {
    form_urlencoded::byte_serialize(name.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("format", &self.codec.format())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryNetwork;
    use feosync_core::{Attachment, CborCodec, Post, PrivateKey, Server};
    use http::Method;

    const SERVER: &str = "https://blog.example.com";

    fn setup() -> (Arc<MemoryNetwork>, Client) {
        let network = MemoryNetwork::new();
        network.add_server(SERVER);
        let client = Client::new(
            format!("{SERVER}/"),
            network.clone(),
            Arc::new(CborCodec),
            ClientConfig::default(),
        );
        (network, client)
    }

    fn signed(key: &PrivateKey, item: &Item) -> (Signature, Bytes) {
        let bytes = CborCodec.encode_item(item).unwrap();
        (key.sign(&bytes), Bytes::from(bytes))
    }

    fn post_with_file(ts: i64, name: &str, size: u64) -> Item {
        Item::new(
            ts,
            ItemKind::Post(Post {
                title: "t".into(),
                body: "b".into(),
                attachments: vec![Attachment {
                    name: name.into(),
                    size,
                }],
            }),
        )
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let (_, client) = setup();
        assert_eq!(client.base_url(), SERVER);
        assert_eq!(client.url(), SERVER);
    }

    #[tokio::test]
    async fn test_put_then_get_item() {
        let (_, client) = setup();
        let key = PrivateKey::generate();
        let user = key.user_id();
        let item = Item::new(100, ItemKind::Post(Post::default()));
        let (sig, bytes) = signed(&key, &item);

        assert!(client
            .get_item_bytes(&user, &sig, GetItemOptions::default())
            .await
            .unwrap()
            .is_none());

        client.put_item(&user, &sig, bytes.clone()).await.unwrap();
        // Writes are idempotent.
        client.put_item(&user, &sig, bytes.clone()).await.unwrap();

        let fetched = client
            .get_item_bytes(&user, &sig, GetItemOptions::default())
            .await
            .unwrap();
        assert_eq!(fetched, Some(bytes));

        let decoded = client
            .get_item(&user, &sig, GetItemOptions::default())
            .await
            .unwrap();
        assert_eq!(decoded, Some(item));
    }

    #[tokio::test]
    async fn test_put_with_bad_signature_is_rejected() {
        let (network, client) = setup();
        let key = PrivateKey::generate();
        let other = PrivateKey::generate();
        let (_, bytes) = signed(&key, &Item::new(1, ItemKind::Post(Post::default())));
        let wrong_sig = other.sign(&bytes);

        let err = client
            .put_item(&key.user_id(), &wrong_sig, bytes)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Status { status, .. } if status == StatusCode::BAD_REQUEST
        ));
        assert_eq!(network.server(SERVER).unwrap().item_count(), 0);
    }

    #[tokio::test]
    async fn test_get_item_verifies_signature() {
        let (network, client) = setup();
        let key = PrivateKey::generate();
        let user = key.user_id();
        let (sig, _) = signed(&key, &Item::new(7, ItemKind::Post(Post::default())));

        // A misbehaving server serving different bytes under this signature.
        let tampered = CborCodec
            .encode_item(&Item::new(8, ItemKind::Post(Post::default())))
            .unwrap();
        network
            .server(SERVER)
            .unwrap()
            .insert_unchecked(&user, &sig, Bytes::from(tampered));

        let err = client
            .get_item_bytes(&user, &sig, GetItemOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Verification { .. }));

        // Skipping the check returns the bytes as served.
        assert!(client
            .get_item_bytes(&user, &sig, GetItemOptions::unverified())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_item_length_limits() {
        let (network, _) = setup();
        let small = Client::new(
            SERVER,
            network.clone(),
            Arc::new(CborCodec),
            ClientConfig {
                max_item_bytes: 4,
                ..Default::default()
            },
        );
        let key = PrivateKey::generate();
        let user = key.user_id();
        let (sig, bytes) = signed(&key, &Item::new(7, ItemKind::Post(Post::default())));
        let server = network.server(SERVER).unwrap();
        server.insert_unchecked(&user, &sig, bytes);

        let err = small
            .get_item_bytes(&user, &sig, GetItemOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::TooLarge { max: 4, .. }));

        let empty_sig = key.sign(b"");
        server.insert_unchecked(&user, &empty_sig, Bytes::new());
        let err = small
            .get_item_bytes(&user, &empty_sig, GetItemOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::EmptyBody { .. }));
    }

    #[tokio::test]
    async fn test_missing_content_length() {
        let (network, client) = setup();
        let key = PrivateKey::generate();
        let user = key.user_id();
        let (sig, bytes) = signed(&key, &Item::new(7, ItemKind::Post(Post::default())));
        let server = network.server(SERVER).unwrap();
        server.put_item_direct(&user, &sig, bytes).unwrap();
        server.set_omit_content_length(true);

        let err = client
            .get_item_bytes(&user, &sig, GetItemOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::MissingHeader { header: "content-length", .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let (network, _) = setup();
        let client = Client::new(
            "https://nowhere.example.com",
            network,
            Arc::new(CborCodec),
            ClientConfig::default(),
        );
        let key = PrivateKey::generate();
        let err = client
            .get_item_bytes(&key.user_id(), &key.sign(b"x"), GetItemOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[tokio::test]
    async fn test_get_profile_returns_newest() {
        let (_, client) = setup();
        let key = PrivateKey::generate();
        let user = key.user_id();
        assert!(client.get_profile(&user).await.unwrap().is_none());

        for (ts, name) in [(10, "old"), (30, "new"), (20, "middle")] {
            let item = Item::new(
                ts,
                ItemKind::Profile(Profile {
                    display_name: name.into(),
                    servers: vec![Server::new(SERVER)],
                    ..Default::default()
                }),
            );
            let (sig, bytes) = signed(&key, &item);
            client.put_item(&user, &sig, bytes).await.unwrap();
        }

        let result = client.get_profile(&user).await.unwrap().unwrap();
        assert_eq!(result.profile.display_name, "new");
        assert_eq!(result.timestamp_ms_utc, 30);
        assert!(result.signature.verify(&user, &result.bytes));
    }

    #[tokio::test]
    async fn test_put_attachment_then_head() {
        let (network, client) = setup();
        let key = PrivateKey::generate();
        let user = key.user_id();
        let (sig, bytes) = signed(&key, &post_with_file(5, "cat.png", 3));
        client.put_item(&user, &sig, bytes).await.unwrap();

        let meta = client.head_attachment(&user, &sig, "cat.png").await.unwrap();
        assert_eq!(meta, AttachmentMeta::default());
        assert!(client
            .get_attachment(&user, &sig, "cat.png")
            .await
            .unwrap()
            .is_none());

        client
            .put_attachment(&user, &sig, "cat.png", Bytes::from_static(b"cat"))
            .await
            .unwrap();
        assert!(client.head_attachment(&user, &sig, "cat.png").await.unwrap().exists);
        assert_eq!(
            client.get_attachment(&user, &sig, "cat.png").await.unwrap(),
            Some(Bytes::from_static(b"cat"))
        );
        assert!(network.server(SERVER).unwrap().has_attachment(&user, &sig, "cat.png"));
    }

    #[tokio::test]
    async fn test_large_attachment_already_present_is_not_uploaded() {
        let (network, _) = setup();
        let client = Client::new(
            SERVER,
            network.clone(),
            Arc::new(CborCodec),
            ClientConfig {
                small_file_threshold: 2,
                ..Default::default()
            },
        );
        let key = PrivateKey::generate();
        let user = key.user_id();
        let (sig, bytes) = signed(&key, &post_with_file(5, "big.bin", 5));
        client.put_item(&user, &sig, bytes).await.unwrap();
        client
            .put_attachment(&user, &sig, "big.bin", Bytes::from_static(b"12345"))
            .await
            .unwrap();

        let server = network.server(SERVER).unwrap();
        server.clear_requests();
        client
            .put_attachment(&user, &sig, "big.bin", Bytes::from_static(b"12345"))
            .await
            .unwrap();
        assert_eq!(server.count_requests(&Method::HEAD, "/files/big.bin"), 1);
        assert_eq!(server.count_requests(&Method::PUT, "/files/big.bin"), 0);
    }

    #[tokio::test]
    async fn test_failed_attachment_upload_reports_status() {
        let (network, client) = setup();
        let key = PrivateKey::generate();
        let user = key.user_id();
        let (sig, bytes) = signed(&key, &post_with_file(5, "cat.png", 3));
        client.put_item(&user, &sig, bytes).await.unwrap();
        network.server(SERVER).unwrap().set_quota(&user, 1);

        let meta = client.head_attachment(&user, &sig, "cat.png").await.unwrap();
        assert!(meta.exceeds_quota);
        assert!(!meta.exists);

        let err = client
            .put_attachment(&user, &sig, "cat.png", Bytes::from_static(b"cat"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Status { .. }));
    }

    // Profile responses a well-behaved server would never send.

    fn profile_item(ts: i64) -> Item {
        Item::new(
            ts,
            ItemKind::Profile(Profile {
                display_name: "someone".into(),
                ..Default::default()
            }),
        )
    }

    #[tokio::test]
    async fn test_get_profile_rejects_non_profile_item() {
        let (network, client) = setup();
        let key = PrivateKey::generate();
        let user = key.user_id();
        let (sig, bytes) = signed(&key, &Item::new(5, ItemKind::Post(Post::default())));
        network
            .server(SERVER)
            .unwrap()
            .set_profile_override(&user, Some(&sig.to_base58()), bytes);

        // A protocol violation, not a missing profile.
        let err = client.get_profile(&user).await.unwrap_err();
        assert!(matches!(err, ClientError::NotAProfile { .. }));
    }

    #[tokio::test]
    async fn test_get_profile_requires_signature_header() {
        for header in [None, Some("")] {
            let (network, client) = setup();
            let key = PrivateKey::generate();
            let user = key.user_id();
            let (_, bytes) = signed(&key, &profile_item(5));
            network
                .server(SERVER)
                .unwrap()
                .set_profile_override(&user, header, bytes);

            let err = client.get_profile(&user).await.unwrap_err();
            assert!(
                matches!(err, ClientError::MissingHeader { header: SIGNATURE_HEADER, .. }),
                "header {header:?} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_get_profile_rejects_unparseable_signature() {
        let (network, client) = setup();
        let key = PrivateKey::generate();
        let user = key.user_id();
        let (_, bytes) = signed(&key, &profile_item(5));
        network
            .server(SERVER)
            .unwrap()
            .set_profile_override(&user, Some("0OIl"), bytes);

        let err = client.get_profile(&user).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidHeader { header: SIGNATURE_HEADER, .. }));
    }

    #[tokio::test]
    async fn test_get_profile_verifies_body_against_header() {
        let (network, client) = setup();
        let key = PrivateKey::generate();
        let user = key.user_id();
        let (_, bytes) = signed(&key, &profile_item(5));
        let (other_sig, _) = signed(&key, &profile_item(6));
        network
            .server(SERVER)
            .unwrap()
            .set_profile_override(&user, Some(&other_sig.to_base58()), bytes);

        let err = client.get_profile(&user).await.unwrap_err();
        assert!(matches!(err, ClientError::Verification { .. }));
    }

    #[tokio::test]
    async fn test_attachment_upload_with_lost_response_succeeds() {
        let (network, client) = setup();
        let key = PrivateKey::generate();
        let user = key.user_id();
        let (sig, bytes) = signed(&key, &post_with_file(5, "cat.png", 3));
        client.put_item(&user, &sig, bytes).await.unwrap();
        let server = network.server(SERVER).unwrap();
        server.set_lose_attachment_put_responses(true);

        client
            .put_attachment(&user, &sig, "cat.png", Bytes::from_static(b"cat"))
            .await
            .unwrap();
        assert!(server.has_attachment(&user, &sig, "cat.png"));
        assert_eq!(server.count_requests(&Method::PUT, "/files/cat.png"), 1);
        // The HEAD after the failed PUT is what finds the file.
        assert_eq!(server.count_requests(&Method::HEAD, "/files/cat.png"), 1);
    }

    #[test]
    fn test_encode_path_segment() {
        assert_eq!(encode_path_segment("cat.png"), "cat.png");
        assert_eq!(
            encode_path_segment("a b?c#d/e+f.png"),
            "a%20b%3Fc%23d%2Fe%2Bf.png"
        );
    }

    #[tokio::test]
    async fn test_attachment_name_stays_one_path_segment() {
        let (network, client) = setup();
        let key = PrivateKey::generate();
        let user = key.user_id();
        let name = "my cat?#/x+y.png";
        let (sig, bytes) = signed(&key, &post_with_file(5, name, 3));
        client.put_item(&user, &sig, bytes).await.unwrap();

        client
            .put_attachment(&user, &sig, name, Bytes::from_static(b"cat"))
            .await
            .unwrap();
        let server = network.server(SERVER).unwrap();
        assert!(server.has_attachment(&user, &sig, name));
        assert!(client.head_attachment(&user, &sig, name).await.unwrap().exists);
        assert_eq!(
            client.get_attachment(&user, &sig, name).await.unwrap(),
            Some(Bytes::from_static(b"cat"))
        );
        assert_eq!(
            server.count_requests(&Method::PUT, "/files/my%20cat%3F%23%2Fx%2By.png"),
            1
        );
    }
}
