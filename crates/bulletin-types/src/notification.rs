use serde::{Deserialize, Serialize};

use crate::models::{Comment, ContentItem};

/// Where a notification goes.
///
/// Providers translate these into their own addressing rules; nothing above
/// the provider knows more than "topic" vs "recipient".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum DeliveryTarget {
    /// Broadcast to every subscriber of the topic.
    Topic(String),
    /// A single user, by username.
    Recipient(String),
}

impl DeliveryTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Topic(_) => "topic",
            Self::Recipient(_) => "recipient",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Topic(name) | Self::Recipient(name) => name,
        }
    }
}

/// An in-flight notification. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    pub title: String,
    pub body: String,
    pub target: DeliveryTarget,
}

impl NotificationEnvelope {
    /// Broadcast announcing a newly created content item.
    pub fn new_content(item: &ContentItem, topic: &str) -> Self {
        Self {
            title: "New Article Added".to_string(),
            body: format!("Article '{}' was added.", item.title),
            target: DeliveryTarget::Topic(topic.to_string()),
        }
    }

    /// Notice for the author of `parent` that `reply` answered them.
    pub fn reply(parent: &Comment, reply: &Comment) -> Self {
        Self {
            title: "New reply to your comment".to_string(),
            body: format!("{} replied: {}", reply.author, preview(&reply.body)),
            target: DeliveryTarget::Recipient(parent.author.clone()),
        }
    }
}

/// Provider acknowledgement of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: String,
}

const PREVIEW_CHARS: usize = 80;

fn preview(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommentId, ContentId};
    use chrono::Utc;

    fn comment(id: i64, author: &str, body: &str) -> Comment {
        Comment {
            id: CommentId(id),
            content_id: ContentId(1),
            parent_id: None,
            author: author.to_string(),
            body: body.to_string(),
            posted_at: Utc::now(),
        }
    }

    #[test]
    fn test_reply_targets_parent_author() {
        let parent = comment(1, "alice", "first");
        let reply = comment(2, "bob", "agreed");
        let env = NotificationEnvelope::reply(&parent, &reply);

        assert_eq!(env.target, DeliveryTarget::Recipient("alice".into()));
        assert!(env.body.contains("bob"));
    }

    #[test]
    fn test_reply_preview_is_truncated() {
        let parent = comment(1, "alice", "first");
        let reply = comment(2, "bob", &"x".repeat(200));
        let env = NotificationEnvelope::reply(&parent, &reply);

        assert!(env.body.ends_with('…'));
        assert_eq!(env.body.chars().filter(|c| *c == 'x').count(), PREVIEW_CHARS);
    }

    #[test]
    fn test_target_serializes_tagged() {
        let json = serde_json::to_value(DeliveryTarget::Topic("all".into())).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "topic", "name": "all" }));
    }
}
