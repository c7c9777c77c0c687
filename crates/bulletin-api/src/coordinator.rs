use std::sync::Arc;

use tracing::{info, warn};

use bulletin_notify::NotificationDispatcher;
use bulletin_types::api::NotificationStatus;
use bulletin_types::models::{CommentId, ContentId, ContentItem, NewContentItem};
use bulletin_types::notification::{DeliveryTarget, NotificationEnvelope};
use bulletin_types::repository::{ContentRepository, StoreError};

use crate::tree::{CommentTree, PostedComment, TreeError};

/// Sequences repository writes and notifications for inbound mutations.
#[derive(Clone)]
pub struct Coordinator {
    repo: Arc<dyn ContentRepository>,
    dispatcher: NotificationDispatcher,
    comments: CommentTree,
    topic: String,
}

impl Coordinator {
    pub fn new(repo: Arc<dyn ContentRepository>, dispatcher: NotificationDispatcher, topic: impl Into<String>) -> Self {
        let comments = CommentTree::new(repo.clone(), dispatcher.clone());
        Self {
            repo,
            dispatcher,
            comments,
            topic: topic.into(),
        }
    }

    pub fn repository(&self) -> &dyn ContentRepository {
        self.repo.as_ref()
    }

    pub fn comments(&self) -> &CommentTree {
        &self.comments
    }

    /// Store an article, then announce it on the broadcast topic.
    ///
    /// Only a failed write fails the call. The announcement outcome is
    /// returned alongside the stored item.
    pub async fn submit_content(&self, item: NewContentItem) -> Result<(ContentItem, NotificationStatus), StoreError> {
        let item = self.repo.insert_content(item).await?;
        info!(content_id = %item.id, title = %item.title, "Article stored");

        let envelope = NotificationEnvelope::new_content(&item, &self.topic);
        let status = self.notify(&envelope).await;
        Ok((item, status))
    }

    pub async fn submit_comment(
        &self,
        content_id: ContentId,
        parent_id: Option<CommentId>,
        author: &str,
        body: &str,
    ) -> Result<PostedComment, TreeError> {
        self.comments.create(content_id, parent_id, author, body).await
    }

    pub async fn delete_comment(&self, id: CommentId) -> Result<usize, TreeError> {
        self.comments.delete_subtree(id).await
    }

    /// Broadcast a fixed test message on the configured topic.
    pub async fn send_test_notification(&self) -> NotificationStatus {
        let envelope = NotificationEnvelope {
            title: "Test Notification".to_string(),
            body: "This is a test notification.".to_string(),
            target: DeliveryTarget::Topic(self.topic.clone()),
        };
        self.notify(&envelope).await
    }

    async fn notify(&self, envelope: &NotificationEnvelope) -> NotificationStatus {
        match self.dispatcher.send(envelope).await {
            Ok(receipt) => NotificationStatus::Delivered {
                message_id: receipt.message_id,
            },
            Err(e) => {
                warn!(route = envelope.target.kind(), to = envelope.target.name(), "Notification not delivered: {}", e);
                NotificationStatus::Failed { reason: e.to_string() }
            }
        }
    }
}
