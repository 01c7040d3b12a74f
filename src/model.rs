#![forbid(unsafe_code)]

//! Documents persisted by the synchronizers.
//!
//! Each struct mirrors the JSON stored in its collection. None of them carry
//! run timestamps, so syncing an unchanged upstream twice leaves identical
//! documents behind.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Channel-level metadata, one document per channel id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDocument {
    pub channel_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub thumbnails: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub statistics: Value,
    /// Listing handle of the channel's uploads (a playlist id on YouTube).
    pub uploads_listing: String,
}

/// Raw upstream video metadata, kept verbatim under `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDocument {
    pub video_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentDocument {
    pub video_id: String,
    pub comment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub like_count: Option<i64>,
    /// Set on replies; points at the top-level comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionDocument {
    pub video_id: String,
    pub language: String,
    pub text: String,
    /// Raw subtitle file the text was normalized from.
    pub source_file: String,
}

/// Single live-chat or superchat entry. Currency and amount are only present
/// on monetized messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub money_currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub money_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Whole message list of one stream type for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatDocument {
    pub video_id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// True when the stored list was cut at the configured cap.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}
