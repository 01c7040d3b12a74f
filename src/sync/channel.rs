#![forbid(unsafe_code)]

use serde_json::Value;

use super::SyncError;
use crate::model::ChannelDocument;
use crate::platform::VideoPlatform;
use crate::store::{Collection, DocumentKey, DocumentStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChannel {
    pub channel_id: String,
    pub uploads_listing: String,
}

/// Resolves `channel_url`, records the channel document and returns the
/// handle of its uploads listing.
pub async fn resolve(
    platform: &dyn VideoPlatform,
    store: &DocumentStore,
    channel_url: &str,
) -> Result<ResolvedChannel, SyncError> {
    let channel_id = platform
        .resolve_channel_id(channel_url)
        .map_err(|source| SyncError::Platform {
            stage: "channel resolution",
            source,
        })?
        .ok_or_else(|| SyncError::ChannelUnresolved {
            url: channel_url.to_owned(),
        })?;

    let info = platform
        .channel_info(&channel_id)
        .map_err(|source| SyncError::Platform {
            stage: "channel metadata",
            source,
        })?
        .ok_or_else(|| SyncError::ChannelMetadataMissing {
            channel_id: channel_id.clone(),
        })?;

    let document = channel_document(&channel_id, &info).ok_or_else(|| {
        SyncError::ListingHandleMissing {
            channel_id: channel_id.clone(),
        }
    })?;

    store
        .upsert(
            Collection::Channels,
            &DocumentKey::single(&channel_id),
            &document,
        )
        .await?;
    tracing::info!(channel_id = %channel_id, title = %document.title, "channel resolved");

    Ok(ResolvedChannel {
        channel_id,
        uploads_listing: document.uploads_listing,
    })
}

fn text_at(info: &Value, pointer: &str) -> Option<String> {
    info.pointer(pointer)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

/// Builds the channel document; `None` when the record has no uploads
/// listing.
fn channel_document(channel_id: &str, info: &Value) -> Option<ChannelDocument> {
    let uploads_listing = text_at(info, "/contentDetails/relatedPlaylists/uploads")?;
    Some(ChannelDocument {
        channel_id: channel_id.to_owned(),
        title: text_at(info, "/snippet/title").unwrap_or_default(),
        description: text_at(info, "/snippet/description").unwrap_or_default(),
        custom_url: text_at(info, "/snippet/customUrl"),
        published_at: text_at(info, "/snippet/publishedAt"),
        thumbnails: info
            .pointer("/snippet/thumbnails")
            .cloned()
            .unwrap_or(Value::Null),
        statistics: info.get("statistics").cloned().unwrap_or(Value::Null),
        uploads_listing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePlatform, temp_store};
    use anyhow::Result;
    use serde_json::json;

    #[tokio::test]
    async fn stores_channel_document_and_returns_listing() -> Result<()> {
        let (_dir, store) = temp_store().await?;
        let platform = FakePlatform::new("UC1", "UU1");

        let resolved = resolve(&platform, &store, "https://www.youtube.com/@demo").await?;
        assert_eq!(resolved.channel_id, "UC1");
        assert_eq!(resolved.uploads_listing, "UU1");

        let stored: ChannelDocument = store
            .find_one(Collection::Channels, &DocumentKey::single("UC1"))
            .await?
            .expect("channel stored");
        assert_eq!(stored.title, "Demo channel");
        assert_eq!(stored.statistics["videoCount"], "2");
        Ok(())
    }

    #[tokio::test]
    async fn unresolvable_url_aborts() -> Result<()> {
        let (_dir, store) = temp_store().await?;
        let mut platform = FakePlatform::new("UC1", "UU1");
        platform.channel_id = None;

        let err = resolve(&platform, &store, "https://example.com/nowhere")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ChannelUnresolved { .. }));
        assert_eq!(store.count(Collection::Channels).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn missing_metadata_aborts() -> Result<()> {
        let (_dir, store) = temp_store().await?;
        let mut platform = FakePlatform::new("UC1", "UU1");
        platform.channel_info = None;

        let err = resolve(&platform, &store, "@demo").await.unwrap_err();
        assert!(matches!(err, SyncError::ChannelMetadataMissing { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn missing_uploads_listing_aborts() -> Result<()> {
        let (_dir, store) = temp_store().await?;
        let mut platform = FakePlatform::new("UC1", "UU1");
        platform.channel_info = Some(json!({"snippet": {"title": "No uploads"}}));

        let err = resolve(&platform, &store, "@demo").await.unwrap_err();
        assert!(matches!(err, SyncError::ListingHandleMissing { .. }));
        assert_eq!(store.count(Collection::Channels).await?, 0);
        Ok(())
    }
}
