#![forbid(unsafe_code)]

//! In-memory platform and store helpers shared by the sync tests.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};

use crate::model::ChatMessage;
use crate::platform::{
    ChatCapabilities, ChatKind, PlatformError, RawVideo, RecordStream, VideoPlatform,
};
use crate::store::DocumentStore;

pub async fn temp_store() -> anyhow::Result<(TempDir, DocumentStore)> {
    let dir = tempdir()?;
    let store = DocumentStore::open(&dir.path().join("sync.db")).await?;
    Ok((dir, store))
}

fn transport_error(endpoint: &str) -> PlatformError {
    PlatformError::Transport {
        endpoint: endpoint.to_owned(),
        message: "connection reset".to_owned(),
    }
}

#[derive(Debug, Clone)]
pub struct FakeVideo {
    pub id: String,
    pub published_at: Option<String>,
    pub metadata: Value,
    pub comments: Vec<Value>,
    pub comments_fail: bool,
    pub subtitles: Option<String>,
    pub live_chat: Vec<ChatMessage>,
    pub super_chat: Vec<ChatMessage>,
    pub chat_fails: bool,
}

impl FakeVideo {
    pub fn new(id: &str, published_at: Option<&str>) -> Self {
        Self {
            id: id.to_owned(),
            published_at: published_at.map(str::to_owned),
            metadata: json!({
                "id": id,
                "snippet": {"title": format!("Video {id}"), "publishedAt": published_at},
                "statistics": {"viewCount": "10"}
            }),
            comments: Vec::new(),
            comments_fail: false,
            subtitles: None,
            live_chat: Vec::new(),
            super_chat: Vec::new(),
            chat_fails: false,
        }
    }
}

/// Scriptable stand-in for the platform client.
#[derive(Debug, Clone)]
pub struct FakePlatform {
    pub channel_id: Option<String>,
    pub channel_info: Option<Value>,
    pub videos: Vec<FakeVideo>,
    /// Ends the listing with a transport error after this many records.
    pub listing_fails_after: Option<usize>,
    pub capabilities: ChatCapabilities,
}

impl FakePlatform {
    pub fn new(channel_id: &str, uploads: &str) -> Self {
        Self {
            channel_id: Some(channel_id.to_owned()),
            channel_info: Some(json!({
                "id": channel_id,
                "snippet": {
                    "title": "Demo channel",
                    "description": "Recipes",
                    "customUrl": "@demo",
                    "publishedAt": "2020-05-01T12:00:00Z",
                    "thumbnails": {"default": {"url": "https://example.com/t.jpg"}}
                },
                "statistics": {"videoCount": "2", "subscriberCount": "100"},
                "contentDetails": {"relatedPlaylists": {"uploads": uploads}}
            })),
            videos: Vec::new(),
            listing_fails_after: None,
            capabilities: ChatCapabilities::all(),
        }
    }

    fn video(&self, video_id: &str) -> Option<&FakeVideo> {
        self.videos.iter().find(|video| video.id == video_id)
    }
}

impl VideoPlatform for FakePlatform {
    fn resolve_channel_id(&self, _channel_url: &str) -> Result<Option<String>, PlatformError> {
        Ok(self.channel_id.clone())
    }

    fn channel_info(&self, _channel_id: &str) -> Result<Option<Value>, PlatformError> {
        Ok(self.channel_info.clone())
    }

    fn channel_videos<'a>(
        &'a self,
        _listing: &str,
    ) -> Result<RecordStream<'a, RawVideo>, PlatformError> {
        let records = self.videos.iter().map(|video| {
            Ok::<_, PlatformError>(RawVideo {
                id: video.id.clone(),
                published_at: video.published_at.clone(),
                metadata: video.metadata.clone(),
            })
        });
        match self.listing_fails_after {
            Some(limit) => Ok(Box::new(
                records
                    .take(limit)
                    .chain(std::iter::once(Err(transport_error("playlistItems")))),
            )),
            None => Ok(Box::new(records)),
        }
    }

    fn video_comments<'a>(
        &'a self,
        video_id: &str,
    ) -> Result<RecordStream<'a, Value>, PlatformError> {
        match self.video(video_id) {
            Some(video) if video.comments_fail => Err(transport_error("commentThreads")),
            Some(video) => {
                let comments = video.comments.clone().into_iter();
                Ok(Box::new(comments.map(Ok::<_, PlatformError>)))
            }
            None => Ok(Box::new(std::iter::empty())),
        }
    }

    fn download_transcription(
        &self,
        video_id: &str,
        language: &str,
        output_dir: &Path,
    ) -> Result<PathBuf, PlatformError> {
        let Some(track) = self.video(video_id).and_then(|video| video.subtitles.as_ref()) else {
            return Err(PlatformError::TrackUnavailable {
                video_id: video_id.to_owned(),
                language: language.to_owned(),
            });
        };
        let path = output_dir.join(format!("{video_id}.{language}.vtt"));
        fs::create_dir_all(output_dir)
            .and_then(|()| fs::write(&path, track))
            .map_err(|source| PlatformError::Io {
                context: format!("writing {}", path.display()),
                source,
            })?;
        Ok(path)
    }

    fn chat_capabilities(&self) -> ChatCapabilities {
        self.capabilities
    }

    fn chat_messages<'a>(
        &'a self,
        video_id: &str,
        kind: ChatKind,
    ) -> Result<RecordStream<'a, ChatMessage>, PlatformError> {
        let Some(video) = self.video(video_id) else {
            return Ok(Box::new(std::iter::empty()));
        };
        if video.chat_fails {
            return Err(PlatformError::ChatUnavailable {
                video_id: video_id.to_owned(),
            });
        }
        let messages = match kind {
            ChatKind::LiveChat => video.live_chat.clone(),
            ChatKind::SuperChat => video.super_chat.clone(),
        };
        Ok(Box::new(messages.into_iter().map(Ok::<_, PlatformError>)))
    }
}

/// Channel with two videos, each carrying two comments, a subtitle track, one
/// live-chat message and one paid message.
pub fn two_video_channel() -> FakePlatform {
    let mut platform = FakePlatform::new("UC1", "UU1");
    for (id, published_at) in [("v1", "2024-01-15T12:00:00Z"), ("v2", "2024-03-01T12:00:00Z")] {
        let mut video = FakeVideo::new(id, Some(published_at));
        video.comments = vec![
            json!({"id": format!("{id}-c1"), "authorDisplayName": "Ana", "textDisplay": "Muito bom", "likeCount": 3}),
            json!({"id": format!("{id}-c1.r1"), "authorDisplayName": "Bia", "textOriginal": "Concordo", "parentId": format!("{id}-c1")}),
        ];
        video.subtitles = Some(format!(
            "WEBVTT\n\n00:00:00.000 --> 00:00:01.000\nola do {id}\n"
        ));
        video.live_chat = vec![ChatMessage {
            id: Some(format!("{id}-m1")),
            author: Some("Caio".into()),
            text: "oi".into(),
            money_currency: None,
            money_amount: None,
            timestamp: Some("2024-01-15T12:00:05+00:00".into()),
        }];
        video.super_chat = vec![ChatMessage {
            id: Some(format!("{id}-p1")),
            author: Some("Duda".into()),
            text: "Parabens".into(),
            money_currency: Some("BRL".into()),
            money_amount: Some(10.0),
            timestamp: Some("2024-01-15T12:00:09+00:00".into()),
        }];
        platform.videos.push(video);
    }
    platform
}
