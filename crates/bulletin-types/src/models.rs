use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned identifier of a content item (an article).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub i64);

/// Store-assigned identifier of a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub i64);

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A company that articles may be filed under.
///
/// Articles reference it through `group_id`; nothing checks that the
/// company exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub title: String,
    pub image: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct NewCompany {
    pub title: String,
    pub image: Option<Vec<u8>>,
}

/// A published article. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub title: String,
    pub body: String,
    pub attachment: Option<Vec<u8>>,
    /// Owning [`Company`] id. Passed through unchanged, never interpreted.
    pub group_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Content as submitted, before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewContentItem {
    pub title: String,
    pub body: String,
    pub attachment: Option<Vec<u8>>,
    pub group_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A node in the comment forest of one content item.
///
/// `parent_id`, when present, always names an already persisted comment of the
/// same content item, so the parent chain can never form a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub content_id: ContentId,
    pub parent_id: Option<CommentId>,
    pub author: String,
    pub body: String,
    pub posted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub content_id: ContentId,
    pub parent_id: Option<CommentId>,
    pub author: String,
    pub body: String,
    pub posted_at: DateTime<Utc>,
}
