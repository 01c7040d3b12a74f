#![forbid(unsafe_code)]

//! Incremental channel synchronization.
//!
//! Stages run in a fixed order: the channel is resolved, its videos are
//! enumerated and filtered by the watermark, then comments, transcriptions
//! and chats are synced for every in-scope video. Only the first two stages
//! can abort a run; the per-video stages record failures and move on.

pub mod channel;
pub mod chat;
pub mod comments;
pub mod pipeline;
pub mod transcriptions;
pub mod videos;

use std::fmt;

use crate::platform::PlatformError;
use crate::store::StoreError;
use crate::watermark::InvalidWatermark;

pub use pipeline::{RunReport, Stage, SyncOptions, run};

/// Errors that abort a whole run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    InvalidWatermark(#[from] InvalidWatermark),

    #[error("could not resolve a channel id for {url}")]
    ChannelUnresolved { url: String },

    #[error("no metadata returned for channel {channel_id}")]
    ChannelMetadataMissing { channel_id: String },

    #[error("channel {channel_id} does not expose an uploads listing")]
    ListingHandleMissing { channel_id: String },

    #[error("{stage} failed: {source}")]
    Platform {
        stage: &'static str,
        source: PlatformError,
    },

    #[error("video listing ended after {seen} record(s): {source}")]
    Enumeration { seen: usize, source: PlatformError },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Error for one video inside a per-video stage.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ItemError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub video_id: String,
    pub reason: String,
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.video_id, self.reason)
    }
}

/// Outcome of one per-video stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Videos attempted.
    pub processed: usize,
    /// Documents written.
    pub stored: usize,
    /// Upstream records dropped without being an error.
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
}

impl StageReport {
    pub(crate) fn record_failure(&mut self, stage: &str, video_id: &str, err: &ItemError) {
        tracing::warn!(stage, video_id, error = %err, "video failed, continuing");
        self.failures.push(ItemFailure {
            video_id: video_id.to_owned(),
            reason: err.to_string(),
        });
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} video(s), {} stored, {} skipped, {} failed",
            self.processed,
            self.stored,
            self.skipped,
            self.failures.len()
        )
    }
}
