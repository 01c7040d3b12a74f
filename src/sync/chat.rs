#![forbid(unsafe_code)]

use super::{ItemError, StageReport};
use crate::model::ChatDocument;
use crate::platform::{ChatKind, VideoPlatform};
use crate::store::{DocumentKey, DocumentStore};

/// Per stream type outcome of the chat stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatReport {
    pub live_chat: StageReport,
    pub super_chat: StageReport,
    /// Stream types the client does not offer; skipped for every video.
    pub unsupported: Vec<ChatKind>,
}

impl ChatReport {
    pub fn stage(&self, kind: ChatKind) -> &StageReport {
        match kind {
            ChatKind::LiveChat => &self.live_chat,
            ChatKind::SuperChat => &self.super_chat,
        }
    }

    fn stage_mut(&mut self, kind: ChatKind) -> &mut StageReport {
        match kind {
            ChatKind::LiveChat => &mut self.live_chat,
            ChatKind::SuperChat => &mut self.super_chat,
        }
    }
}

/// Replaces the stored message list of every supported stream type for
/// every video. `max_messages` caps each stored list.
pub async fn sync(
    platform: &dyn VideoPlatform,
    store: &DocumentStore,
    video_ids: &[String],
    max_messages: Option<usize>,
) -> ChatReport {
    let capabilities = platform.chat_capabilities();
    let mut report = ChatReport::default();

    for kind in ChatKind::ALL {
        if !capabilities.supports(kind) {
            tracing::warn!(stream = kind.label(), "chat stream not supported by client, skipping");
            report.unsupported.push(kind);
            continue;
        }

        let stage = report.stage_mut(kind);
        for video_id in video_ids {
            stage.processed += 1;
            match sync_video(platform, store, video_id, kind, max_messages).await {
                Ok(()) => stage.stored += 1,
                Err(err) => stage.record_failure(kind.label(), video_id, &err),
            }
        }
        tracing::info!(
            stream = kind.label(),
            stored = stage.stored,
            failed = stage.failures.len(),
            "chat stream synced"
        );
    }
    report
}

async fn sync_video(
    platform: &dyn VideoPlatform,
    store: &DocumentStore,
    video_id: &str,
    kind: ChatKind,
    max_messages: Option<usize>,
) -> Result<(), ItemError> {
    let mut messages = Vec::new();
    let mut truncated = false;
    for message in platform.chat_messages(video_id, kind)? {
        if max_messages.is_some_and(|cap| messages.len() >= cap) {
            truncated = true;
            break;
        }
        messages.push(message?);
    }
    if truncated {
        tracing::debug!(video_id, stream = kind.label(), kept = messages.len(), "chat list truncated");
    }

    let document = ChatDocument {
        video_id: video_id.to_owned(),
        messages,
        truncated,
    };
    store
        .upsert(kind.collection(), &DocumentKey::single(video_id), &document)
        .await?;
    Ok(())
}
