use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use bulletin_notify::NotificationDispatcher;
use bulletin_types::models::{Comment, CommentId, ContentId, NewComment};
use bulletin_types::notification::NotificationEnvelope;
use bulletin_types::repository::{ContentRepository, DeleteInterrupted, StoreError};

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("article {0} not found")]
    ContentNotFound(ContentId),
    #[error("comment {parent_id} is not a comment on article {content_id}")]
    InvalidParent { content_id: ContentId, parent_id: CommentId },
    #[error("comment {0} not found")]
    NotFound(CommentId),
    #[error(
        "cascade delete stopped after removing {} of {} comments: {source}",
        .removed.len(),
        .removed.len() + .remaining.len()
    )]
    PartialDeletion {
        removed: Vec<CommentId>,
        remaining: Vec<CommentId>,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// A freshly persisted comment.
#[derive(Debug)]
pub struct PostedComment {
    pub comment: Comment,
    /// Background reply notification, present when the comment has a parent.
    /// Dropping the handle detaches the task.
    pub reply_notice: Option<JoinHandle<()>>,
}

/// Threaded comments on articles.
#[derive(Clone)]
pub struct CommentTree {
    repo: Arc<dyn ContentRepository>,
    dispatcher: NotificationDispatcher,
}

impl CommentTree {
    pub fn new(repo: Arc<dyn ContentRepository>, dispatcher: NotificationDispatcher) -> Self {
        Self { repo, dispatcher }
    }

    /// Persist a comment and, for replies, notify the parent's author.
    ///
    /// The parent must be a comment on the same article; otherwise nothing is
    /// written. Notification runs on its own task and never fails the call.
    pub async fn create(
        &self,
        content_id: ContentId,
        parent_id: Option<CommentId>,
        author: &str,
        body: &str,
    ) -> Result<PostedComment, TreeError> {
        let author = author.trim();
        if author.is_empty() {
            return Err(TreeError::EmptyField("author"));
        }
        if body.trim().is_empty() {
            return Err(TreeError::EmptyField("body"));
        }

        if self.repo.find_content(content_id).await?.is_none() {
            return Err(TreeError::ContentNotFound(content_id));
        }

        let parent = match parent_id {
            Some(parent_id) => {
                let parent = self
                    .repo
                    .find_comment(parent_id)
                    .await?
                    .filter(|p| p.content_id == content_id)
                    .ok_or(TreeError::InvalidParent { content_id, parent_id })?;
                Some(parent)
            }
            None => None,
        };

        let comment = self
            .repo
            .insert_comment(NewComment {
                content_id,
                parent_id,
                author: author.to_string(),
                body: body.to_string(),
                posted_at: Utc::now(),
            })
            .await?;

        info!(
            comment_id = %comment.id,
            content_id = %content_id,
            parent_id = ?parent_id.map(|p| p.0),
            "Comment posted"
        );

        let reply_notice = parent.map(|parent| self.notify_reply(parent, comment.clone()));
        Ok(PostedComment { comment, reply_notice })
    }

    fn notify_reply(&self, parent: Comment, reply: Comment) -> JoinHandle<()> {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let envelope = NotificationEnvelope::reply(&parent, &reply);
            match dispatcher.send(&envelope).await {
                Ok(receipt) => debug!(
                    comment_id = %reply.id,
                    to = %parent.author,
                    message_id = %receipt.message_id,
                    "Reply notification sent"
                ),
                Err(e) => warn!(
                    comment_id = %reply.id,
                    to = %parent.author,
                    "Reply notification failed: {}",
                    e
                ),
            }
        })
    }

    pub async fn get(&self, id: CommentId) -> Result<Comment, TreeError> {
        self.repo.find_comment(id).await?.ok_or(TreeError::NotFound(id))
    }

    /// All comments of an article, newest first.
    pub async fn list(&self, content_id: ContentId) -> Result<Vec<Comment>, TreeError> {
        Ok(self.repo.list_comments(content_id).await?)
    }

    /// Ids of `root` and all of its descendants, every reply ahead of the
    /// comment it answers.
    ///
    /// Walks with an explicit stack, so reply depth does not grow the call stack.
    pub async fn subtree(&self, root: CommentId) -> Result<Vec<CommentId>, TreeError> {
        let root = self.get(root).await?;

        let mut pending = vec![root.id];
        let mut seen = HashSet::new();
        let mut order = Vec::new();

        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                warn!(comment_id = %id, "Comment reached twice during traversal, skipping");
                continue;
            }
            order.push(id);
            for child in self.repo.find_children(id).await? {
                pending.push(child.id);
            }
        }

        // Pre-order puts every ancestor before its descendants.
        order.reverse();
        Ok(order)
    }

    /// Delete a comment together with every reply beneath it.
    ///
    /// Returns the number of comments this call removed. Replies deleted by
    /// a concurrent request in the meantime are not counted.
    pub async fn delete_subtree(&self, id: CommentId) -> Result<usize, TreeError> {
        let mut order = self.subtree(id).await?;

        match self.repo.delete_comments(order.clone()).await {
            Ok(deleted) => {
                if deleted < order.len() {
                    debug!(
                        comment_id = %id,
                        already_gone = order.len() - deleted,
                        "Some replies were deleted concurrently"
                    );
                }
                info!(comment_id = %id, deleted, "Comment thread deleted");
                Ok(deleted)
            }
            Err(DeleteInterrupted { removed: 0, source }) => Err(TreeError::Storage(source)),
            Err(DeleteInterrupted { removed, source }) => {
                let remaining = order.split_off(removed.min(order.len()));
                warn!(
                    comment_id = %id,
                    removed = order.len(),
                    remaining = remaining.len(),
                    "Comment thread partially deleted: {}",
                    source
                );
                Err(TreeError::PartialDeletion {
                    removed: order,
                    remaining,
                    source,
                })
            }
        }
    }
}
