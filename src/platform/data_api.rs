#![forbid(unsafe_code)]

//! Blocking YouTube Data API v3 client.
//!
//! Listings are paged lazily: a page is requested only when the caller drains
//! the previous one. Several API keys may be configured; the client moves to
//! the next key when the current one runs out of quota or is rejected.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use super::{PlatformError, RawVideo};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const PAGE_SIZE: &str = "50";
const COMMENT_PAGE_SIZE: &str = "100";
const SEARCH_CANDIDATES: &str = "5";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error reasons that mean "this key is spent", not "this request is wrong".
/// Short-term throttling (`rateLimitExceeded`) is not one of them.
const ROTATING_REASONS: [&str; 4] = [
    "quotaExceeded",
    "dailyLimitExceeded",
    "keyInvalid",
    "keyExpired",
];

/// API keys in configured order plus the index of the one in use.
#[derive(Debug)]
struct KeyRing {
    keys: Vec<String>,
    current: Mutex<usize>,
}

impl KeyRing {
    fn new(keys: Vec<String>) -> Self {
        let keys = keys
            .into_iter()
            .map(|key| key.trim().to_owned())
            .filter(|key| !key.is_empty())
            .collect();
        Self {
            keys,
            current: Mutex::new(0),
        }
    }

    fn current(&self) -> Result<String, PlatformError> {
        if self.keys.is_empty() {
            return Err(PlatformError::NoApiKeys);
        }
        let index = *self.current.lock();
        self.keys
            .get(index)
            .cloned()
            .ok_or(PlatformError::KeysExhausted {
                keys: self.keys.len(),
            })
    }

    /// Retires the key in use. Returns false when no key is left.
    fn advance(&self) -> bool {
        let mut index = self.current.lock();
        if *index < self.keys.len() {
            *index += 1;
        }
        *index < self.keys.len()
    }
}

/// Where a channel URL points, before any API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelLocator {
    Id(String),
    Handle(String),
    Username(String),
    Custom(String),
}

/// Understands `/channel/<id>`, `/@handle`, `/user/<name>`, `/c/<name>`,
/// legacy `/<name>` URLs, and bare handles or channel ids.
pub fn parse_channel_url(url: &str) -> Option<ChannelLocator> {
    let trimmed = url.trim();
    let without_fragment = trimmed.split('#').next().unwrap_or(trimmed);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);
    let without_scheme = without_query
        .strip_prefix("https://")
        .or_else(|| without_query.strip_prefix("http://"))
        .unwrap_or(without_query);

    let (has_host, path) = match without_scheme.split_once('/') {
        Some((host, rest)) if host.contains("youtube.com") => (true, rest),
        _ if without_scheme.contains("youtube.com") => (true, ""),
        _ => (false, without_scheme),
    };

    let segments: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    let first = *segments.first()?;

    if let Some(handle) = first.strip_prefix('@') {
        return (!handle.is_empty()).then(|| ChannelLocator::Handle(handle.to_owned()));
    }

    match (first, segments.get(1)) {
        ("channel", Some(id)) => Some(ChannelLocator::Id((*id).to_owned())),
        ("user", Some(name)) => Some(ChannelLocator::Username((*name).to_owned())),
        ("c", Some(name)) => Some(ChannelLocator::Custom((*name).to_owned())),
        ("channel" | "user" | "c", None) => None,
        (value, None) if !has_host && looks_like_channel_id(value) => {
            Some(ChannelLocator::Id(value.to_owned()))
        }
        (value, None) if has_host && !["watch", "playlist", "results", "feed"].contains(&value) => {
            Some(ChannelLocator::Custom(value.to_owned()))
        }
        _ => None,
    }
}

fn looks_like_channel_id(value: &str) -> bool {
    value.len() == 24
        && value.starts_with("UC")
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

/// Extracts `error.errors[0].reason` (or `error.status`) from an API error body.
fn error_reason(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .pointer("/errors/0/reason")
        .or_else(|| error.get("status"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

pub struct DataApiClient {
    agent: ureq::Agent,
    base_url: String,
    keys: KeyRing,
}

impl DataApiClient {
    pub fn new(keys: Vec<String>) -> Self {
        Self::with_base_url(keys, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(keys: Vec<String>, base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_owned(),
            keys: KeyRing::new(keys),
        }
    }

    /// Issues one GET, rotating through keys on quota errors.
    fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, PlatformError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        loop {
            let key = self.keys.current()?;
            let mut request = self.agent.get(&url).query("key", &key);
            for (name, value) in params {
                request = request.query(name, value);
            }

            match request.call() {
                Ok(response) => {
                    return response
                        .into_json::<Value>()
                        .map_err(|err| PlatformError::Decode {
                            endpoint: endpoint.to_owned(),
                            message: err.to_string(),
                        });
                }
                Err(ureq::Error::Status(status, response)) => {
                    let body = response.into_string().unwrap_or_default();
                    let reason = error_reason(&body).unwrap_or_default();
                    if ROTATING_REASONS.contains(&reason.as_str()) {
                        tracing::warn!(endpoint, status, reason = %reason, "API key rejected, rotating");
                        if self.keys.advance() {
                            continue;
                        }
                        return Err(PlatformError::KeysExhausted {
                            keys: self.keys.keys.len(),
                        });
                    }
                    return Err(PlatformError::Http {
                        endpoint: endpoint.to_owned(),
                        status,
                        reason: if reason.is_empty() { body } else { reason },
                    });
                }
                Err(ureq::Error::Transport(transport)) => {
                    return Err(PlatformError::Transport {
                        endpoint: endpoint.to_owned(),
                        message: transport.to_string(),
                    });
                }
            }
        }
    }

    fn first_item(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Option<Value>, PlatformError> {
        let response = self.get(endpoint, params)?;
        Ok(response
            .get("items")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .cloned())
    }

    pub fn resolve_channel_id(&self, channel_url: &str) -> Result<Option<String>, PlatformError> {
        let Some(locator) = parse_channel_url(channel_url) else {
            tracing::warn!(channel_url, "unrecognized channel URL");
            return Ok(None);
        };

        let item = match &locator {
            ChannelLocator::Id(id) => return Ok(Some(id.clone())),
            ChannelLocator::Handle(handle) => {
                let handle = format!("@{handle}");
                self.first_item("channels", &[("part", "id"), ("forHandle", &handle)])?
            }
            ChannelLocator::Username(name) => {
                self.first_item("channels", &[("part", "id"), ("forUsername", name)])?
            }
            ChannelLocator::Custom(name) => return self.resolve_custom_name(name),
        };

        Ok(item.and_then(|item| {
            item.get("id")
                .and_then(Value::as_str)
                .map(str::to_owned)
        }))
    }

    /// `/c/<name>` and legacy `/<name>` URLs have no lookup endpoint, so the
    /// name goes through channel search. Search is fuzzy: a hit only counts
    /// when its custom URL or title is the name itself.
    fn resolve_custom_name(&self, name: &str) -> Result<Option<String>, PlatformError> {
        let hits = self.get(
            "search",
            &[
                ("part", "snippet"),
                ("type", "channel"),
                ("maxResults", SEARCH_CANDIDATES),
                ("q", name),
            ],
        )?;
        let ids: Vec<String> = items_of(&hits)
            .iter()
            .filter_map(|hit| {
                hit.pointer("/snippet/channelId")
                    .or_else(|| hit.pointer("/id/channelId"))
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
            .collect();
        if ids.is_empty() {
            return Ok(None);
        }

        let joined = ids.join(",");
        let channels = self.get("channels", &[("part", "snippet"), ("id", &joined)])?;
        let matched = items_of(&channels)
            .iter()
            .find(|channel| channel_matches_name(channel, name))
            .and_then(|channel| channel.get("id").and_then(Value::as_str).map(str::to_owned));
        if matched.is_none() {
            tracing::warn!(name, candidates = ids.len(), "no search hit matches the custom channel name");
        }
        Ok(matched)
    }

    pub fn channel_info(&self, channel_id: &str) -> Result<Option<Value>, PlatformError> {
        self.first_item(
            "channels",
            &[
                ("part", "snippet,contentDetails,statistics"),
                ("id", channel_id),
            ],
        )
    }

    /// Videos of an uploads playlist with full `videos` details, page by page.
    pub fn playlist_videos(&self, playlist_id: &str) -> PlaylistVideos<'_> {
        PlaylistVideos {
            pages: Pages::new(
                self,
                "playlistItems",
                vec![
                    ("part", "contentDetails".to_owned()),
                    ("playlistId", playlist_id.to_owned()),
                    ("maxResults", PAGE_SIZE.to_owned()),
                ],
            ),
            buffer: VecDeque::new(),
        }
    }

    /// Top-level comments of a video followed by the replies the API inlines.
    pub fn comment_threads(&self, video_id: &str) -> CommentThreads<'_> {
        CommentThreads {
            pages: Pages::new(
                self,
                "commentThreads",
                vec![
                    ("part", "snippet,replies".to_owned()),
                    ("videoId", video_id.to_owned()),
                    ("maxResults", COMMENT_PAGE_SIZE.to_owned()),
                ],
            ),
            buffer: VecDeque::new(),
        }
    }

    fn video_details(&self, ids: &[String]) -> Result<HashMap<String, Value>, PlatformError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let joined = ids.join(",");
        let response = self.get(
            "videos",
            &[
                ("part", "snippet,contentDetails,statistics,liveStreamingDetails"),
                ("id", &joined),
            ],
        )?;
        let mut details = HashMap::new();
        for item in items_of(&response) {
            if let Some(id) = item.get("id").and_then(Value::as_str) {
                details.insert(id.to_owned(), item.clone());
            }
        }
        Ok(details)
    }
}

/// Case-insensitive match of a channel's `customUrl` (with or without the
/// leading `@`) or title against a custom URL name.
fn channel_matches_name(channel: &Value, name: &str) -> bool {
    let wanted = name.trim_start_matches('@').to_lowercase();
    let custom_url = channel
        .pointer("/snippet/customUrl")
        .and_then(Value::as_str)
        .map(|url| url.trim_start_matches('@').to_lowercase());
    let title = channel
        .pointer("/snippet/title")
        .and_then(Value::as_str)
        .map(str::to_lowercase);
    custom_url.as_deref() == Some(wanted.as_str()) || title.as_deref() == Some(wanted.as_str())
}

fn items_of(response: &Value) -> Vec<Value> {
    response
        .get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Walks `nextPageToken` links, fetching one page per `next` call.
struct Pages<'a> {
    client: &'a DataApiClient,
    endpoint: &'static str,
    params: Vec<(&'static str, String)>,
    page_token: Option<String>,
    finished: bool,
}

impl<'a> Pages<'a> {
    fn new(
        client: &'a DataApiClient,
        endpoint: &'static str,
        params: Vec<(&'static str, String)>,
    ) -> Self {
        Self {
            client,
            endpoint,
            params,
            page_token: None,
            finished: false,
        }
    }
}

impl Iterator for Pages<'_> {
    type Item = Result<Vec<Value>, PlatformError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut params: Vec<(&str, &str)> = self
            .params
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect();
        if let Some(token) = &self.page_token {
            params.push(("pageToken", token));
        }

        let response = match self.client.get(self.endpoint, &params) {
            Ok(response) => response,
            Err(err) => {
                self.finished = true;
                return Some(Err(err));
            }
        };

        self.page_token = response
            .get("nextPageToken")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_owned);
        if self.page_token.is_none() {
            self.finished = true;
        }
        Some(Ok(items_of(&response)))
    }
}

pub struct PlaylistVideos<'a> {
    pages: Pages<'a>,
    buffer: VecDeque<RawVideo>,
}

impl Iterator for PlaylistVideos<'_> {
    type Item = Result<RawVideo, PlatformError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(video) = self.buffer.pop_front() {
                return Some(Ok(video));
            }
            let page = match self.pages.next()? {
                Ok(page) => page,
                Err(err) => return Some(Err(err)),
            };
            let ids: Vec<String> = page.iter().filter_map(playlist_video_id).collect();
            let details = match self.pages.client.video_details(&ids) {
                Ok(details) => details,
                Err(err) => {
                    self.pages.finished = true;
                    return Some(Err(err));
                }
            };
            self.buffer.extend(merge_page(&page, details));
        }
    }
}

fn playlist_video_id(item: &Value) -> Option<String> {
    item.pointer("/contentDetails/videoId")
        .or_else(|| item.pointer("/snippet/resourceId/videoId"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Pairs playlist entries with their `videos` details, keeping playlist
/// order. Entries without details (private or deleted videos) keep the
/// playlist item itself as metadata.
fn merge_page(page: &[Value], mut details: HashMap<String, Value>) -> Vec<RawVideo> {
    page.iter()
        .filter_map(|item| {
            let id = playlist_video_id(item)?;
            let listed_at = item
                .pointer("/contentDetails/videoPublishedAt")
                .and_then(Value::as_str)
                .map(str::to_owned);
            let video = match details.remove(&id) {
                Some(detail) => RawVideo {
                    published_at: detail
                        .pointer("/snippet/publishedAt")
                        .and_then(Value::as_str)
                        .map(str::to_owned)
                        .or(listed_at),
                    metadata: detail,
                    id,
                },
                None => RawVideo {
                    id,
                    published_at: listed_at,
                    metadata: item.clone(),
                },
            };
            Some(video)
        })
        .collect()
}

pub struct CommentThreads<'a> {
    pages: Pages<'a>,
    buffer: VecDeque<Value>,
}

impl Iterator for CommentThreads<'_> {
    type Item = Result<Value, PlatformError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(comment) = self.buffer.pop_front() {
                return Some(Ok(comment));
            }
            match self.pages.next()? {
                Ok(threads) => {
                    for thread in &threads {
                        self.buffer.extend(flatten_thread(thread));
                    }
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Turns a `commentThread` resource into flat comment records: the snippet
/// fields of each comment plus its `id`.
fn flatten_thread(thread: &Value) -> Vec<Value> {
    let mut comments = Vec::new();
    if let Some(top) = thread.pointer("/snippet/topLevelComment") {
        comments.push(flatten_comment(top, thread.get("id")));
    }
    if let Some(replies) = thread.pointer("/replies/comments").and_then(Value::as_array) {
        comments.extend(replies.iter().map(|reply| flatten_comment(reply, None)));
    }
    comments
}

fn flatten_comment(comment: &Value, fallback_id: Option<&Value>) -> Value {
    let mut record = comment
        .get("snippet")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    if let Some(id) = comment.get("id").filter(|id| id.is_string()) {
        record.insert("id".to_owned(), id.clone());
    } else if let Some(id) = fallback_id.filter(|id| id.is_string()) {
        record.insert("commentId".to_owned(), id.clone());
    }
    Value::Object(record)
}
