//! Storage port shared by the scanner, the comment tree and the HTTP layer.
//!
//! Every method may suspend on I/O. Implementations surface failures as
//! [`StoreError`] and never retry internally.

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::models::{Comment, CommentId, Company, ContentId, ContentItem, NewComment, NewCompany, NewContentItem};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection, lock or worker failure. Transient from the caller's view.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// The store refused the write (foreign key, uniqueness, ...).
    #[error("constraint violated: {0}")]
    Constraint(String),
}

/// A batch delete stopped early. The first `removed` ids of the batch are gone.
#[derive(Debug, Error)]
#[error("delete interrupted after {removed} rows: {source}")]
pub struct DeleteInterrupted {
    pub removed: usize,
    #[source]
    pub source: StoreError,
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait ContentRepository: Send + Sync {
    /// Items with `created_at` strictly after `after`, ascending by creation time.
    fn find_created_after(&self, after: DateTime<Utc>) -> BoxFuture<'_, StoreResult<Vec<ContentItem>>>;

    fn find_content(&self, id: ContentId) -> BoxFuture<'_, StoreResult<Option<ContentItem>>>;

    fn list_content(&self) -> BoxFuture<'_, StoreResult<Vec<ContentItem>>>;

    fn list_content_by_group(&self, group_id: i64) -> BoxFuture<'_, StoreResult<Vec<ContentItem>>>;

    /// Persists and commits. The item is durable once this resolves.
    fn insert_content(&self, item: NewContentItem) -> BoxFuture<'_, StoreResult<ContentItem>>;

    fn list_companies(&self) -> BoxFuture<'_, StoreResult<Vec<Company>>>;

    fn find_company(&self, id: i64) -> BoxFuture<'_, StoreResult<Option<Company>>>;

    fn insert_company(&self, company: NewCompany) -> BoxFuture<'_, StoreResult<Company>>;

    fn find_comment(&self, id: CommentId) -> BoxFuture<'_, StoreResult<Option<Comment>>>;

    /// Direct replies to `id`.
    fn find_children(&self, id: CommentId) -> BoxFuture<'_, StoreResult<Vec<Comment>>>;

    /// All comments of a content item, newest first.
    fn list_comments(&self, content_id: ContentId) -> BoxFuture<'_, StoreResult<Vec<Comment>>>;

    /// Persists and commits.
    fn insert_comment(&self, comment: NewComment) -> BoxFuture<'_, StoreResult<Comment>>;

    /// Deletes `ids` in the given order and commits once.
    ///
    /// Returns how many rows this call removed; ids already gone are not
    /// counted. A transactional store rolls back on failure and reports
    /// `removed: 0`.
    fn delete_comments(&self, ids: Vec<CommentId>) -> BoxFuture<'_, Result<usize, DeleteInterrupted>>;
}
