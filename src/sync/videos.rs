#![forbid(unsafe_code)]

use std::collections::HashSet;

use super::SyncError;
use crate::model::VideoDocument;
use crate::platform::VideoPlatform;
use crate::store::{Collection, DocumentKey, DocumentStore};
use crate::watermark::Watermark;

/// In-scope video ids of a listing, in upstream order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enumeration {
    pub video_ids: Vec<String>,
    /// Listing records consumed.
    pub seen: usize,
}

impl Enumeration {
    pub fn included(&self) -> usize {
        self.video_ids.len()
    }
}

/// Records every listed video and returns the ids the watermark keeps.
///
/// A listing error or a failed write aborts: child stages must never run
/// against an incomplete id set.
pub async fn enumerate(
    platform: &dyn VideoPlatform,
    store: &DocumentStore,
    listing: &str,
    watermark: &Watermark,
) -> Result<Enumeration, SyncError> {
    let records = platform
        .channel_videos(listing)
        .map_err(|source| SyncError::Platform {
            stage: "video listing",
            source,
        })?;

    let mut enumeration = Enumeration::default();
    let mut included = HashSet::new();
    for record in records {
        let video = record.map_err(|source| SyncError::Enumeration {
            seen: enumeration.seen,
            source,
        })?;
        enumeration.seen += 1;

        let document = VideoDocument {
            video_id: video.id.clone(),
            published_at: video.published_at.clone(),
            metadata: video.metadata,
        };
        store
            .upsert(
                Collection::Videos,
                &DocumentKey::single(&video.id),
                &document,
            )
            .await?;

        if !watermark.in_scope(video.published_at.as_deref()) {
            tracing::debug!(video_id = %video.id, published_at = ?video.published_at, "before watermark");
            continue;
        }
        if included.insert(video.id.clone()) {
            enumeration.video_ids.push(video.id);
        }
    }

    tracing::info!(
        listing,
        seen = enumeration.seen,
        included = enumeration.included(),
        "videos enumerated"
    );
    Ok(enumeration)
}
