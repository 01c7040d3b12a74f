#![forbid(unsafe_code)]

use std::fmt;
use std::path::PathBuf;

use super::channel::{self, ResolvedChannel};
use super::chat::{self, ChatReport};
use super::{SyncError, StageReport, comments, transcriptions, videos};
use crate::platform::VideoPlatform;
use crate::store::DocumentStore;
use crate::watermark::Watermark;

/// Per-video stages that can be left out of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Stage {
    Comments,
    Transcriptions,
    Chat,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Comments => "comments",
            Stage::Transcriptions => "transcriptions",
            Stage::Chat => "chat",
        })
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub channel_url: String,
    /// Raw watermark; parsed once at the start of the run.
    pub since: Option<String>,
    pub language: String,
    pub transcription_dir: PathBuf,
    pub max_chat_messages: Option<usize>,
    pub skip: Vec<Stage>,
}

impl SyncOptions {
    pub fn new(channel_url: impl Into<String>) -> Self {
        Self {
            channel_url: channel_url.into(),
            since: None,
            language: crate::config::DEFAULT_LANGUAGE.to_owned(),
            transcription_dir: PathBuf::from(crate::config::DEFAULT_TRANSCRIPTION_DIR),
            max_chat_messages: None,
            skip: Vec::new(),
        }
    }

    fn runs(&self, stage: Stage) -> bool {
        !self.skip.contains(&stage)
    }
}

/// Summary of a completed run. Skipped stages are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub channel: ResolvedChannel,
    pub videos_seen: usize,
    pub video_ids: Vec<String>,
    pub comments: Option<StageReport>,
    pub transcriptions: Option<StageReport>,
    pub chat: Option<ChatReport>,
}

impl RunReport {
    pub fn failure_count(&self) -> usize {
        let chat = self
            .chat
            .as_ref()
            .map(|chat| chat.live_chat.failures.len() + chat.super_chat.failures.len())
            .unwrap_or(0);
        self.comments.as_ref().map_or(0, |r| r.failures.len())
            + self.transcriptions.as_ref().map_or(0, |r| r.failures.len())
            + chat
    }
}

/// Runs every stage for one channel, strictly in order.
pub async fn run(
    platform: &dyn VideoPlatform,
    store: &DocumentStore,
    options: &SyncOptions,
) -> Result<RunReport, SyncError> {
    let watermark = Watermark::parse(options.since.as_deref())?;
    if let Some(cutoff) = watermark.cutoff() {
        tracing::info!(since = %cutoff.to_rfc3339(), "watermark active");
    }

    let channel = channel::resolve(platform, store, &options.channel_url).await?;
    let enumeration =
        videos::enumerate(platform, store, &channel.uploads_listing, &watermark).await?;
    let video_ids = enumeration.video_ids;

    let comments = if options.runs(Stage::Comments) {
        Some(comments::sync(platform, store, &video_ids).await)
    } else {
        tracing::info!("comment sync skipped");
        None
    };

    let transcriptions = if options.runs(Stage::Transcriptions) {
        Some(
            transcriptions::sync(
                platform,
                store,
                &video_ids,
                &options.language,
                &options.transcription_dir,
            )
            .await,
        )
    } else {
        tracing::info!("transcription sync skipped");
        None
    };

    let chat = if options.runs(Stage::Chat) {
        Some(chat::sync(platform, store, &video_ids, options.max_chat_messages).await)
    } else {
        tracing::info!("chat sync skipped");
        None
    };

    Ok(RunReport {
        channel,
        videos_seen: enumeration.seen,
        video_ids,
        comments,
        transcriptions,
        chat,
    })
}
