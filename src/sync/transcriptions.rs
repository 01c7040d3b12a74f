#![forbid(unsafe_code)]

use std::path::Path;

use super::{ItemError, StageReport};
use crate::model::TranscriptionDocument;
use crate::platform::{PlatformError, VideoPlatform};
use crate::store::{Collection, DocumentKey, DocumentStore};
use crate::subtitles::normalize_track;

const STAGE: &str = "transcriptions";

/// Downloads, normalizes and stores one transcription per video.
pub async fn sync(
    platform: &dyn VideoPlatform,
    store: &DocumentStore,
    video_ids: &[String],
    language: &str,
    output_dir: &Path,
) -> StageReport {
    let mut report = StageReport::default();
    for video_id in video_ids {
        report.processed += 1;
        match sync_video(platform, store, video_id, language, output_dir).await {
            Ok(()) => report.stored += 1,
            Err(err) => report.record_failure(STAGE, video_id, &err),
        }
    }
    tracing::info!(
        language,
        stored = report.stored,
        failed = report.failures.len(),
        "transcriptions synced"
    );
    report
}

async fn sync_video(
    platform: &dyn VideoPlatform,
    store: &DocumentStore,
    video_id: &str,
    language: &str,
    output_dir: &Path,
) -> Result<(), ItemError> {
    let track = platform.download_transcription(video_id, language, output_dir)?;
    let raw = tokio::fs::read_to_string(&track)
        .await
        .map_err(|source| PlatformError::Io {
            context: format!("reading {}", track.display()),
            source,
        })?;

    let document = TranscriptionDocument {
        video_id: video_id.to_owned(),
        language: language.to_owned(),
        text: normalize_track(&raw),
        source_file: track.to_string_lossy().into_owned(),
    };
    store
        .upsert(
            Collection::Transcriptions,
            &DocumentKey::single(video_id),
            &document,
        )
        .await?;
    tracing::debug!(video_id, track = %track.display(), "transcription stored");
    Ok(())
}
