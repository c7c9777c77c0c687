use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{CommentId, ContentId};

// -- Companies --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCompanyRequest {
    pub title: String,
    /// Base64 encoded logo.
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompanyResponse {
    pub id: i64,
    pub title: String,
    pub image: Option<String>,
}

// -- Articles --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateArticleRequest {
    pub title: String,
    pub text: String,
    /// Base64 encoded attachment bytes.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub group_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ArticleResponse {
    pub id: ContentId,
    pub title: String,
    pub text: String,
    pub image: Option<String>,
    pub group_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateArticleResponse {
    pub article: ArticleResponse,
    pub notification: NotificationStatus,
}

// -- Comments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    pub author: String,
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteCommentResponse {
    pub deleted: usize,
}

// -- Notifications --

/// Best-effort outcome reported next to a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationStatus {
    Delivered { message_id: String },
    /// Handed to a background task; the outcome is only logged.
    Queued,
    Failed { reason: String },
    NotRequested,
}
