#![forbid(unsafe_code)]

use serde_json::Value;

use super::{ItemError, StageReport};
use crate::model::CommentDocument;
use crate::platform::VideoPlatform;
use crate::store::{Collection, DocumentKey, DocumentStore};

const STAGE: &str = "comments";

/// Syncs the comments of every video. A failing video is recorded and the
/// next one is attempted; comments already written for it stay.
pub async fn sync(
    platform: &dyn VideoPlatform,
    store: &DocumentStore,
    video_ids: &[String],
) -> StageReport {
    let mut report = StageReport::default();
    for video_id in video_ids {
        report.processed += 1;
        if let Err(err) = sync_video(platform, store, video_id, &mut report).await {
            report.record_failure(STAGE, video_id, &err);
        }
    }
    tracing::info!(
        stored = report.stored,
        skipped = report.skipped,
        failed = report.failures.len(),
        "comments synced"
    );
    report
}

async fn sync_video(
    platform: &dyn VideoPlatform,
    store: &DocumentStore,
    video_id: &str,
    report: &mut StageReport,
) -> Result<(), ItemError> {
    for raw in platform.video_comments(video_id)? {
        let raw = raw?;
        let Some(document) = comment_document(video_id, &raw) else {
            tracing::debug!(video_id, "comment without id skipped");
            report.skipped += 1;
            continue;
        };
        store
            .upsert(
                Collection::Comments,
                &DocumentKey::pair(video_id, &document.comment_id),
                &document,
            )
            .await?;
        report.stored += 1;
    }
    Ok(())
}

fn string_field(raw: &Value, field: &str) -> Option<String> {
    raw.get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// `None` when the record carries neither `id` nor `commentId`.
fn comment_document(video_id: &str, raw: &Value) -> Option<CommentDocument> {
    let comment_id = string_field(raw, "id").or_else(|| string_field(raw, "commentId"))?;
    Some(CommentDocument {
        video_id: video_id.to_owned(),
        comment_id,
        author: string_field(raw, "authorDisplayName").or_else(|| string_field(raw, "author")),
        text: string_field(raw, "textDisplay").or_else(|| string_field(raw, "textOriginal")),
        published_at: string_field(raw, "publishedAt"),
        like_count: raw.get("likeCount").and_then(Value::as_i64),
        parent_id: string_field(raw, "parentId"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePlatform, FakeVideo, temp_store};
    use anyhow::Result;
    use serde_json::json;

    #[test]
    fn document_prefers_canonical_id_and_display_text() {
        let raw = json!({
            "id": "c1",
            "commentId": "legacy",
            "authorDisplayName": "Ana",
            "textDisplay": "Oi <b>gente</b>",
            "textOriginal": "Oi gente",
            "publishedAt": "2024-01-02T03:04:05Z",
            "likeCount": 7,
            "parentId": "c0"
        });
        let document = comment_document("v1", &raw).expect("document");
        assert_eq!(document.comment_id, "c1");
        assert_eq!(document.text.as_deref(), Some("Oi <b>gente</b>"));
        assert_eq!(document.like_count, Some(7));
        assert_eq!(document.parent_id.as_deref(), Some("c0"));
    }

    #[test]
    fn document_falls_back_to_legacy_fields() {
        let raw = json!({"commentId": "c2", "textOriginal": "plain"});
        let document = comment_document("v1", &raw).expect("document");
        assert_eq!(document.comment_id, "c2");
        assert_eq!(document.text.as_deref(), Some("plain"));
        assert!(document.author.is_none());
    }

    #[tokio::test]
    async fn comment_without_id_is_skipped_not_failed() -> Result<()> {
        let (_dir, store) = temp_store().await?;
        let mut platform = FakePlatform::new("UC1", "UU1");
        let mut video = FakeVideo::new("v1", None);
        video.comments = vec![
            json!({"id": "c1", "textDisplay": "first"}),
            json!({"textDisplay": "anonymous"}),
            json!({"id": "", "textDisplay": "blank id"}),
        ];
        platform.videos = vec![video];

        let report = sync(&platform, &store, &["v1".to_owned()]).await;
        assert_eq!(report.stored, 1);
        assert_eq!(report.skipped, 2);
        assert!(report.failures.is_empty());
        assert_eq!(store.count(Collection::Comments).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn failing_video_does_not_block_the_next() -> Result<()> {
        let (_dir, store) = temp_store().await?;
        let mut platform = FakePlatform::new("UC1", "UU1");
        let mut broken = FakeVideo::new("a", None);
        broken.comments_fail = true;
        let mut healthy = FakeVideo::new("b", None);
        healthy.comments = vec![json!({"id": "b1"}), json!({"id": "b2"})];
        platform.videos = vec![broken, healthy];

        let report = sync(&platform, &store, &["a".to_owned(), "b".to_owned()]).await;
        assert_eq!(report.processed, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].video_id, "a");

        let stored: Vec<CommentDocument> = store.find_all(Collection::Comments).await?;
        let ids: Vec<&str> = stored.iter().map(|c| c.comment_id.as_str()).collect();
        assert_eq!(ids, ["b1", "b2"]);
        Ok(())
    }

    #[tokio::test]
    async fn same_comment_id_under_different_videos_is_kept_apart() -> Result<()> {
        let (_dir, store) = temp_store().await?;
        let mut platform = FakePlatform::new("UC1", "UU1");
        let mut first = FakeVideo::new("a", None);
        first.comments = vec![json!({"id": "shared"})];
        let mut second = FakeVideo::new("b", None);
        second.comments = vec![json!({"id": "shared"})];
        platform.videos = vec![first, second];

        let ids = ["a".to_owned(), "b".to_owned()];
        sync(&platform, &store, &ids).await;
        sync(&platform, &store, &ids).await;
        assert_eq!(store.count(Collection::Comments).await?, 2);
        Ok(())
    }
}
