//! In-memory servers for testing.
//!
//! [`MemoryNetwork`] implements [`Fetch`] by routing each request to the
//! [`MemoryServer`] whose base URL prefixes the request URL. A server
//! implements the same REST surface a real one does: it verifies signatures
//! on upload, stores content by `(user, signature)`, serves paginated
//! listings and enforces attachment quotas.
//!
//! Servers can also be told to misbehave, and they record every request so
//! tests can assert on traffic.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH};
use http::{HeaderMap, Method, StatusCode};
use url::form_urlencoded;

use feosync_core::{
    newest_first, Attachment, CborCodec, Item, ItemCodec, ItemKind, ItemList, ItemListEntry,
    ItemType, Signature, UserId,
};

use crate::client::{QUOTA_EXCEEDED_HEADER, SIGNATURE_HEADER};
use crate::error::{ClientError, Result};
use crate::fetch::{Fetch, FetchRequest, FetchResponse};
use crate::listing::ListingOffset;

/// Largest item a memory server accepts.
const MAX_ITEM_BYTES: usize = 1024 * 1024;

const DEFAULT_PAGE_SIZE: usize = 20;

/// A set of in-memory servers reachable by base URL.
pub struct MemoryNetwork {
    servers: RwLock<HashMap<String, Arc<MemoryServer>>>,
}

impl MemoryNetwork {
    /// Create an empty network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            servers: RwLock::new(HashMap::new()),
        })
    }

    /// Start a server at `base_url`, or return the one already there.
    pub fn add_server(&self, base_url: &str) -> Arc<MemoryServer> {
        let base_url = base_url.trim_end_matches('/');
        let mut servers = self.servers.write().unwrap_or_else(PoisonError::into_inner);
        servers
            .entry(base_url.to_string())
            .or_insert_with(|| Arc::new(MemoryServer::new(base_url, Arc::new(CborCodec))))
            .clone()
    }

    pub fn server(&self, base_url: &str) -> Option<Arc<MemoryServer>> {
        let servers = self.servers.read().unwrap_or_else(PoisonError::into_inner);
        servers.get(base_url.trim_end_matches('/')).cloned()
    }

    /// Take a server off the network. Requests to it fail as unreachable.
    pub fn remove_server(&self, base_url: &str) -> Option<Arc<MemoryServer>> {
        let mut servers = self.servers.write().unwrap_or_else(PoisonError::into_inner);
        servers.remove(base_url.trim_end_matches('/'))
    }

    fn route(&self, url: &str) -> Option<(Arc<MemoryServer>, String)> {
        let servers = self.servers.read().unwrap_or_else(PoisonError::into_inner);
        servers.iter().find_map(|(base_url, server)| {
            let rest = url.strip_prefix(base_url.as_str())?;
            rest.starts_with('/')
                .then(|| (server.clone(), rest.to_string()))
        })
    }
}

#[async_trait]
impl Fetch for MemoryNetwork {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let (server, path) = self.route(&request.url).ok_or_else(|| {
            ClientError::Transport(format!("connection refused: {}", request.url))
        })?;
        Ok(server.handle(&request.method, &path, request.body))
    }
}

/// A request as seen by a [`MemoryServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    /// Path and query, relative to the server's base URL.
    pub path: String,
}

struct StoredItem {
    bytes: Bytes,
    timestamp_ms_utc: i64,
    item_type: ItemType,
    reply_to: Option<(UserId, Signature)>,
    follows: Vec<UserId>,
    attachments: Vec<Attachment>,
}

impl StoredItem {
    fn new(bytes: Bytes, item: Option<Item>) -> Self {
        let mut stored = Self {
            bytes,
            timestamp_ms_utc: 0,
            item_type: ItemType::Unknown,
            reply_to: None,
            follows: Vec::new(),
            attachments: Vec::new(),
        };
        let Some(item) = item else {
            return stored;
        };

        stored.timestamp_ms_utc = item.timestamp_ms_utc;
        stored.item_type = item.item_type();
        match item.kind {
            ItemKind::Post(post) => stored.attachments = post.attachments,
            ItemKind::Profile(profile) => {
                stored.follows = profile
                    .follows
                    .iter()
                    .filter_map(|follow| follow.user_id().ok())
                    .collect();
            }
            ItemKind::Comment(comment) => {
                let reply = &comment.reply_to;
                if let (Ok(user), Ok(sig)) = (
                    UserId::from_bytes(&reply.user_id),
                    Signature::from_bytes(&reply.signature),
                ) {
                    stored.reply_to = Some((user, sig));
                }
            }
        }
        stored
    }
}

struct ServerState {
    items: HashMap<(UserId, Signature), StoredItem>,
    attachments: HashMap<(UserId, Signature, String), Bytes>,
    attachment_bytes: HashMap<UserId, u64>,
    quotas: HashMap<UserId, u64>,
    page_size: usize,
    fail_listings: bool,
    fail_item_puts: bool,
    omit_content_length: bool,
    lose_attachment_put_responses: bool,
    profile_overrides: HashMap<UserId, ProfileOverride>,
    requests: Vec<RecordedRequest>,
}

/// A canned answer for a user's profile endpoint.
struct ProfileOverride {
    signature_header: Option<String>,
    bytes: Bytes,
}

impl ServerState {
    fn newest_profile(&self, user: &UserId) -> Option<(&Signature, &StoredItem)> {
        self.items
            .iter()
            .filter(|((owner, _), stored)| owner == user && stored.item_type == ItemType::Profile)
            .map(|((_, sig), stored)| (sig, stored))
            .max_by(|(a_sig, a), (b_sig, b)| {
                (a.timestamp_ms_utc, a_sig.as_bytes()).cmp(&(b.timestamp_ms_utc, b_sig.as_bytes()))
            })
    }

    fn would_exceed_quota(&self, user: &UserId, additional: u64) -> bool {
        match self.quotas.get(user) {
            None => false,
            Some(quota) => {
                let used = self.attachment_bytes.get(user).copied().unwrap_or(0);
                used.saturating_add(additional) > *quota
            }
        }
    }
}

enum Route {
    Homepage,
    UserItems(UserId),
    Feed(UserId),
    Profile(UserId),
    Item(UserId, Signature),
    Replies(UserId, Signature),
    Attachment(UserId, Signature, String),
}

enum Listing {
    Homepage,
    Users(HashSet<UserId>),
    Replies(UserId, Signature),
}

/// A single in-memory server.
pub struct MemoryServer {
    base_url: String,
    codec: Arc<dyn ItemCodec>,
    state: Mutex<ServerState>,
}

impl MemoryServer {
    pub fn new(base_url: &str, codec: Arc<dyn ItemCodec>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            codec,
            state: Mutex::new(ServerState {
                items: HashMap::new(),
                attachments: HashMap::new(),
                attachment_bytes: HashMap::new(),
                quotas: HashMap::new(),
                page_size: DEFAULT_PAGE_SIZE,
                fail_listings: false,
                fail_item_puts: false,
                omit_content_length: false,
                lose_attachment_put_responses: false,
                profile_overrides: HashMap::new(),
                requests: Vec::new(),
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Knobs.

    /// Maximum entries per listing page.
    pub fn set_page_size(&self, page_size: usize) {
        self.lock().page_size = page_size.max(1);
    }

    /// Answer every listing request with a 500.
    pub fn set_fail_listings(&self, fail: bool) {
        self.lock().fail_listings = fail;
    }

    /// Refuse every item upload with 507 Insufficient Storage.
    pub fn set_fail_item_puts(&self, fail: bool) {
        self.lock().fail_item_puts = fail;
    }

    /// Leave `Content-Length` off item responses.
    pub fn set_omit_content_length(&self, omit: bool) {
        self.lock().omit_content_length = omit;
    }

    /// Store uploaded attachments but answer the PUT with a 500, as if the
    /// response was lost on the way back.
    pub fn set_lose_attachment_put_responses(&self, lose: bool) {
        self.lock().lose_attachment_put_responses = lose;
    }

    /// Answer `user`'s profile requests with `bytes` and the given signature
    /// header, whatever is stored. `None` leaves the header off.
    pub fn set_profile_override(
        &self,
        user: &UserId,
        signature_header: Option<&str>,
        bytes: Bytes,
    ) {
        self.lock().profile_overrides.insert(
            *user,
            ProfileOverride {
                signature_header: signature_header.map(str::to_string),
                bytes,
            },
        );
    }

    /// Limit the attachment bytes `user` may store.
    pub fn set_quota(&self, user: &UserId, bytes: u64) {
        self.lock().quotas.insert(*user, bytes);
    }

    // Direct access, bypassing the request log.

    /// Store an item the way a PUT would. Returns `Ok(true)` if it was new.
    pub fn put_item_direct(
        &self,
        user: &UserId,
        signature: &Signature,
        bytes: Bytes,
    ) -> std::result::Result<bool, StatusCode> {
        if self.lock().fail_item_puts {
            return Err(StatusCode::INSUFFICIENT_STORAGE);
        }
        if self.has_item(user, signature) {
            return Ok(false);
        }
        if bytes.len() > MAX_ITEM_BYTES {
            return Err(StatusCode::PAYLOAD_TOO_LARGE);
        }
        if !signature.verify(user, &bytes) {
            return Err(StatusCode::BAD_REQUEST);
        }
        let item = self
            .codec
            .decode_item(&bytes)
            .map_err(|_| StatusCode::BAD_REQUEST)?;
        item.validate().map_err(|_| StatusCode::BAD_REQUEST)?;

        let mut state = self.lock();
        if state.items.contains_key(&(*user, *signature)) {
            return Ok(false);
        }
        state
            .items
            .insert((*user, *signature), StoredItem::new(bytes, Some(item)));
        Ok(true)
    }

    /// Store bytes under `(user, signature)` without any checks, replacing
    /// whatever was there. Simulates a misbehaving server.
    pub fn insert_unchecked(&self, user: &UserId, signature: &Signature, bytes: Bytes) {
        let item = self.codec.decode_item(&bytes).ok();
        self.lock()
            .items
            .insert((*user, *signature), StoredItem::new(bytes, item));
    }

    /// Store an attachment the way a PUT would. Returns `Ok(true)` if it was new.
    pub fn put_attachment_direct(
        &self,
        user: &UserId,
        signature: &Signature,
        name: &str,
        bytes: Bytes,
    ) -> std::result::Result<bool, StatusCode> {
        let mut state = self.lock();
        let Some(stored) = state.items.get(&(*user, *signature)) else {
            return Err(StatusCode::NOT_FOUND);
        };
        if !stored.attachments.iter().any(|a| a.name == name) {
            return Err(StatusCode::BAD_REQUEST);
        }

        let key = (*user, *signature, name.to_string());
        if state.attachments.contains_key(&key) {
            return Ok(false);
        }
        let length = bytes.len() as u64;
        if state.would_exceed_quota(user, length) {
            return Err(StatusCode::INSUFFICIENT_STORAGE);
        }

        state.attachments.insert(key, bytes);
        *state.attachment_bytes.entry(*user).or_insert(0) += length;
        Ok(true)
    }

    pub fn has_item(&self, user: &UserId, signature: &Signature) -> bool {
        self.lock().items.contains_key(&(*user, *signature))
    }

    pub fn item_count(&self) -> usize {
        self.lock().items.len()
    }

    /// Number of items stored for `user`.
    pub fn user_item_count(&self, user: &UserId) -> usize {
        self.lock()
            .items
            .keys()
            .filter(|(owner, _)| owner == user)
            .count()
    }

    pub fn has_attachment(&self, user: &UserId, signature: &Signature, name: &str) -> bool {
        self.lock()
            .attachments
            .contains_key(&(*user, *signature, name.to_string()))
    }

    /// Attachment bytes stored for `user`.
    pub fn attachment_bytes_used(&self, user: &UserId) -> u64 {
        self.lock().attachment_bytes.get(user).copied().unwrap_or(0)
    }

    // Request log.

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Count logged requests with `method` whose path contains `path_part`.
    pub fn count_requests(&self, method: &Method, path_part: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == *method && r.path.contains(path_part))
            .count()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    // Request handling.

    fn handle(&self, method: &Method, path_and_query: &str, body: Option<Bytes>) -> FetchResponse {
        self.lock().requests.push(RecordedRequest {
            method: method.clone(),
            path: path_and_query.to_string(),
        });

        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_and_query, None),
        };
        let Some(route) = self.parse_route(path) else {
            return empty(StatusCode::NOT_FOUND);
        };

        let get = *method == Method::GET;
        match route {
            Route::Homepage if get => self.list(Listing::Homepage, query),
            Route::UserItems(user) if get => {
                self.list(Listing::Users(HashSet::from([user])), query)
            }
            Route::Feed(user) if get => {
                let mut users: HashSet<UserId> = {
                    let state = self.lock();
                    state
                        .newest_profile(&user)
                        .map(|(_, stored)| stored.follows.iter().copied().collect())
                        .unwrap_or_default()
                };
                users.insert(user);
                self.list(Listing::Users(users), query)
            }
            Route::Replies(user, sig) if get => self.list(Listing::Replies(user, sig), query),
            Route::Profile(user) if get => self.get_profile(&user),
            Route::Item(user, sig) if get => self.get_item(&user, &sig),
            Route::Item(user, sig) if *method == Method::PUT => {
                match self.put_item_direct(&user, &sig, body.unwrap_or_default()) {
                    Ok(true) => empty(StatusCode::CREATED),
                    Ok(false) => empty(StatusCode::ACCEPTED),
                    Err(status) => empty(status),
                }
            }
            Route::Attachment(user, sig, name) => self.attachment(method, &user, &sig, &name, body),
            _ => empty(StatusCode::METHOD_NOT_ALLOWED),
        }
    }

    fn parse_route(&self, path: &str) -> Option<Route> {
        let format = self.codec.format();
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let user = |s: &str| UserId::from_base58(s).ok();
        let sig = |s: &str| Signature::from_base58(s).ok();

        let route = match segments.as_slice() {
            ["homepage", f] if *f == format => Route::Homepage,
            ["u", u, f] if *f == format => Route::UserItems(user(u)?),
            ["u", u, "feed", f] if *f == format => Route::Feed(user(u)?),
            ["u", u, "profile", f] if *f == format => Route::Profile(user(u)?),
            ["u", u, "i", s, f] if *f == format => Route::Item(user(u)?, sig(s)?),
            ["u", u, "i", s, "replies", f] if *f == format => Route::Replies(user(u)?, sig(s)?),
            ["u", u, "i", s, "files", name] => {
                Route::Attachment(user(u)?, sig(s)?, decode_path_segment(name)?)
            }
            _ => return None,
        };
        Some(route)
    }

    fn get_item(&self, user: &UserId, signature: &Signature) -> FetchResponse {
        let state = self.lock();
        match state.items.get(&(*user, *signature)) {
            None => empty(StatusCode::NOT_FOUND),
            Some(stored) => with_body(
                StatusCode::OK,
                HeaderMap::new(),
                stored.bytes.clone(),
                !state.omit_content_length,
            ),
        }
    }

    fn get_profile(&self, user: &UserId) -> FetchResponse {
        let state = self.lock();
        let (signature_header, bytes) = match state.profile_overrides.get(user) {
            Some(canned) => (canned.signature_header.clone(), canned.bytes.clone()),
            None => match state.newest_profile(user) {
                Some((signature, stored)) => (Some(signature.to_base58()), stored.bytes.clone()),
                None => return empty(StatusCode::NOT_FOUND),
            },
        };

        let mut headers = HeaderMap::new();
        if let Some(Ok(value)) = signature_header.map(HeaderValue::try_from) {
            headers.insert(HeaderName::from_static(SIGNATURE_HEADER), value);
        }
        with_body(StatusCode::OK, headers, bytes, !state.omit_content_length)
    }

    fn list(&self, listing: Listing, query: Option<&str>) -> FetchResponse {
        let state = self.lock();
        if state.fail_listings {
            return empty(StatusCode::INTERNAL_SERVER_ERROR);
        }
        let Ok(offset) = parse_offset(query) else {
            return empty(StatusCode::BAD_REQUEST);
        };

        let mut entries: Vec<ItemListEntry> = state
            .items
            .iter()
            .filter(|((user, _), stored)| match &listing {
                Listing::Homepage => stored.item_type == ItemType::Post,
                Listing::Users(users) => users.contains(user),
                Listing::Replies(to_user, to_sig) => {
                    stored.reply_to == Some((*to_user, *to_sig))
                }
            })
            .filter(|(_, stored)| match offset {
                None => true,
                Some(ListingOffset::Before(ts)) => stored.timestamp_ms_utc < ts,
                Some(ListingOffset::After(ts)) => stored.timestamp_ms_utc > ts,
            })
            .map(|((user, sig), stored)| {
                ItemListEntry::new(user, sig, stored.timestamp_ms_utc, stored.item_type)
            })
            .collect();
        entries.sort_by(newest_first);

        let page_size = state.page_size;
        let no_more_items = entries.len() <= page_size;
        let items = match offset {
            // Forward pages hold the oldest entries after the offset, still newest-first.
            Some(ListingOffset::After(_)) => {
                entries.split_off(entries.len().saturating_sub(page_size))
            }
            _ => {
                entries.truncate(page_size);
                entries
            }
        };

        let list = ItemList {
            items,
            no_more_items,
        };
        match self.codec.encode_item_list(&list) {
            Ok(bytes) => with_body(StatusCode::OK, HeaderMap::new(), Bytes::from(bytes), true),
            Err(_) => empty(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    fn attachment(
        &self,
        method: &Method,
        user: &UserId,
        signature: &Signature,
        name: &str,
        body: Option<Bytes>,
    ) -> FetchResponse {
        if *method == Method::PUT {
            let body = body.unwrap_or_default();
            let stored = self.put_attachment_direct(user, signature, name, body);
            if stored.is_ok() && self.lock().lose_attachment_put_responses {
                return empty(StatusCode::INTERNAL_SERVER_ERROR);
            }
            return match stored {
                Ok(true) => empty(StatusCode::CREATED),
                Ok(false) => empty(StatusCode::ACCEPTED),
                Err(StatusCode::INSUFFICIENT_STORAGE) => {
                    quota_exceeded(StatusCode::INSUFFICIENT_STORAGE)
                }
                Err(status) => empty(status),
            };
        }

        let state = self.lock();
        let stored = state
            .attachments
            .get(&(*user, *signature, name.to_string()))
            .cloned();

        match (method, stored) {
            (m, Some(bytes)) if *m == Method::GET => {
                with_body(StatusCode::OK, HeaderMap::new(), bytes, true)
            }
            (m, Some(bytes)) if *m == Method::HEAD => {
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len() as u64));
                FetchResponse::buffered(StatusCode::OK, headers, Bytes::new())
            }
            (m, None) if *m == Method::HEAD => {
                let declared = state
                    .items
                    .get(&(*user, *signature))
                    .and_then(|item| item.attachments.iter().find(|a| a.name == name))
                    .map(|a| a.size);
                match declared {
                    Some(size) if state.would_exceed_quota(user, size) => {
                        quota_exceeded(StatusCode::NOT_FOUND)
                    }
                    _ => empty(StatusCode::NOT_FOUND),
                }
            }
            (m, None) if *m == Method::GET => empty(StatusCode::NOT_FOUND),
            _ => empty(StatusCode::METHOD_NOT_ALLOWED),
        }
    }
}

impl std::fmt::Debug for MemoryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryServer")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

fn parse_offset(query: Option<&str>) -> std::result::Result<Option<ListingOffset>, ()> {
    let Some(query) = query else {
        return Ok(None);
    };
    let mut offset = None;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        let ts: i64 = value.parse().map_err(|_| ())?;
        offset = match key.as_ref() {
            "before" => Some(ListingOffset::Before(ts)),
            "after" => Some(ListingOffset::After(ts)),
            _ => offset,
        };
    }
    Ok(offset)
}

/// Decode a segment written by [`encode_path_segment`]. `None` if it is
/// empty or could not have come from it.
///
/// [`encode_path_segment`]: crate::client::encode_path_segment
fn decode_path_segment(segment: &str) -> Option<String> {
    if segment.is_empty() || segment.contains(['+', '=', '&']) {
        return None;
    }
    form_urlencoded::parse(segment.as_bytes())
        .next()
        .map(|(name, _)| name.into_owned())
}

fn empty(status: StatusCode) -> FetchResponse {
    FetchResponse::buffered(status, HeaderMap::new(), Bytes::new())
}

fn quota_exceeded(status: StatusCode) -> FetchResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static(QUOTA_EXCEEDED_HEADER),
        HeaderValue::from_static("1"),
    );
    FetchResponse::buffered(status, headers, Bytes::new())
}

fn with_body(
    status: StatusCode,
    mut headers: HeaderMap,
    body: Bytes,
    content_length: bool,
) -> FetchResponse {
    if content_length {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len() as u64));
    }
    FetchResponse::buffered(status, headers, body)
}
