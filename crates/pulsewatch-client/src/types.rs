use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One page of the upstream comment listing, newest-first, with an opaque
/// continuation token when more pages exist.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentsPage {
    pub comments: Vec<CommentPayload>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

/// One raw comment as delivered by the upstream.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentPayload {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub author: String,
    #[serde(rename = "likeCount", default)]
    pub like_count: i64,
    #[serde(rename = "replyCount", default)]
    pub reply_count: i64,
    #[serde(rename = "publishedAt")]
    pub published_at: DateTime<Utc>,
}

/// Descriptive metadata for one resource.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataPayload {
    pub id: String,
    pub title: String,
    #[serde(rename = "ownerName", default)]
    pub owner_name: String,
}
