#![forbid(unsafe_code)]

//! Upstream video platform capability consumed by the synchronizers.
//!
//! The sync engine only sees the [`VideoPlatform`] trait. [`YouTubeClient`]
//! backs it with the YouTube Data API for listings and comments, and with
//! `yt-dlp` for subtitle tracks and live-chat replays.

pub mod data_api;
pub mod live_chat;
pub mod ytdlp;

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::model::ChatMessage;
use crate::store::Collection;

pub use data_api::DataApiClient;
pub use ytdlp::YtDlp;

/// Lazy, finite, non-restartable sequence of upstream records. An `Err` item
/// ends the sequence.
pub type RecordStream<'a, T> = Box<dyn Iterator<Item = Result<T, PlatformError>> + 'a>;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("API request to {endpoint} failed with status {status}: {reason}")]
    Http {
        endpoint: String,
        status: u16,
        reason: String,
    },

    #[error("API request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("every configured API key ({keys}) is exhausted or rejected")]
    KeysExhausted { keys: usize },

    #[error("no API key configured")]
    NoApiKeys,

    #[error("unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("no {language} subtitle track available for {video_id}")]
    TrackUnavailable { video_id: String, language: String },

    #[error("no live chat replay available for {video_id}")]
    ChatUnavailable { video_id: String },

    #[error("{tool} exited with {status} for {target}")]
    ToolFailed {
        tool: &'static str,
        status: String,
        target: String,
    },

    #[error("{0} is not available on this platform client")]
    Unsupported(&'static str),
}

/// Raw video record from the channel listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawVideo {
    pub id: String,
    pub published_at: Option<String>,
    /// Upstream metadata exactly as returned.
    pub metadata: Value,
}

/// Chat stream types a client may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatKind {
    LiveChat,
    SuperChat,
}

impl ChatKind {
    pub const ALL: [ChatKind; 2] = [ChatKind::LiveChat, ChatKind::SuperChat];

    pub fn label(self) -> &'static str {
        match self {
            ChatKind::LiveChat => "live chat",
            ChatKind::SuperChat => "superchat",
        }
    }

    pub fn collection(self) -> Collection {
        match self {
            ChatKind::LiveChat => Collection::LiveChats,
            ChatKind::SuperChat => Collection::SuperChats,
        }
    }
}

/// Chat stream types declared by a client once per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChatCapabilities {
    pub live_chat: bool,
    pub super_chat: bool,
}

impl ChatCapabilities {
    pub fn all() -> Self {
        Self {
            live_chat: true,
            super_chat: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn supports(&self, kind: ChatKind) -> bool {
        match kind {
            ChatKind::LiveChat => self.live_chat,
            ChatKind::SuperChat => self.super_chat,
        }
    }
}

/// Everything the sync engine needs from the upstream platform.
pub trait VideoPlatform {
    /// Maps a human-facing channel URL to the platform channel id.
    fn resolve_channel_id(&self, channel_url: &str) -> Result<Option<String>, PlatformError>;

    /// One raw channel metadata record, `None` when the channel is unknown.
    fn channel_info(&self, channel_id: &str) -> Result<Option<Value>, PlatformError>;

    fn channel_videos<'a>(
        &'a self,
        listing: &str,
    ) -> Result<RecordStream<'a, RawVideo>, PlatformError>;

    /// Raw comment records of a video, replies included.
    fn video_comments<'a>(&'a self, video_id: &str)
    -> Result<RecordStream<'a, Value>, PlatformError>;

    /// Writes the raw subtitle track for `language` into `output_dir` and
    /// returns its path.
    fn download_transcription(
        &self,
        video_id: &str,
        language: &str,
        output_dir: &Path,
    ) -> Result<PathBuf, PlatformError>;

    fn chat_capabilities(&self) -> ChatCapabilities;

    fn chat_messages<'a>(
        &'a self,
        video_id: &str,
        kind: ChatKind,
    ) -> Result<RecordStream<'a, ChatMessage>, PlatformError>;
}

/// Production client: Data API for metadata, yt-dlp for tracks and chat.
pub struct YouTubeClient {
    data: DataApiClient,
    ytdlp: Option<YtDlp>,
}

impl YouTubeClient {
    pub fn new(data: DataApiClient, ytdlp: Option<YtDlp>) -> Self {
        if ytdlp.is_none() {
            tracing::warn!("yt-dlp unavailable: transcriptions and chat replays cannot be fetched");
        }
        Self { data, ytdlp }
    }

    fn ytdlp(&self, feature: &'static str) -> Result<&YtDlp, PlatformError> {
        self.ytdlp.as_ref().ok_or(PlatformError::Unsupported(feature))
    }
}

impl VideoPlatform for YouTubeClient {
    fn resolve_channel_id(&self, channel_url: &str) -> Result<Option<String>, PlatformError> {
        self.data.resolve_channel_id(channel_url)
    }

    fn channel_info(&self, channel_id: &str) -> Result<Option<Value>, PlatformError> {
        self.data.channel_info(channel_id)
    }

    fn channel_videos<'a>(
        &'a self,
        listing: &str,
    ) -> Result<RecordStream<'a, RawVideo>, PlatformError> {
        Ok(Box::new(self.data.playlist_videos(listing)))
    }

    fn video_comments<'a>(
        &'a self,
        video_id: &str,
    ) -> Result<RecordStream<'a, Value>, PlatformError> {
        Ok(Box::new(self.data.comment_threads(video_id)))
    }

    fn download_transcription(
        &self,
        video_id: &str,
        language: &str,
        output_dir: &Path,
    ) -> Result<PathBuf, PlatformError> {
        self.ytdlp("subtitle download")?
            .download_subtitles(video_id, language, output_dir)
    }

    fn chat_capabilities(&self) -> ChatCapabilities {
        match &self.ytdlp {
            Some(_) => ChatCapabilities::all(),
            None => ChatCapabilities::none(),
        }
    }

    fn chat_messages<'a>(
        &'a self,
        video_id: &str,
        kind: ChatKind,
    ) -> Result<RecordStream<'a, ChatMessage>, PlatformError> {
        self.ytdlp("live chat replay")?.chat_messages(video_id, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_report_supported_kinds() {
        let only_live = ChatCapabilities {
            live_chat: true,
            super_chat: false,
        };
        assert!(only_live.supports(ChatKind::LiveChat));
        assert!(!only_live.supports(ChatKind::SuperChat));
        assert!(ChatKind::ALL.iter().all(|kind| ChatCapabilities::all().supports(*kind)));
        assert!(ChatKind::ALL.iter().all(|kind| !ChatCapabilities::none().supports(*kind)));
    }

    #[test]
    fn chat_kinds_write_to_their_own_collection() {
        assert_eq!(ChatKind::LiveChat.collection(), Collection::LiveChats);
        assert_eq!(ChatKind::SuperChat.collection(), Collection::SuperChats);
    }

    #[test]
    fn client_without_ytdlp_declares_no_chat_streams() {
        let client = YouTubeClient::new(DataApiClient::new(vec!["key".into()]), None);
        assert_eq!(client.chat_capabilities(), ChatCapabilities::none());
        let err = client
            .download_transcription("v1", "pt", Path::new("/tmp"))
            .unwrap_err();
        assert!(matches!(err, PlatformError::Unsupported(_)));
    }
}
