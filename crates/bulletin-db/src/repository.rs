use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use rusqlite::ErrorCode;
use tracing::error;

use bulletin_types::models::{
    Comment, CommentId, Company, ContentId, ContentItem, NewComment, NewCompany, NewContentItem,
};
use bulletin_types::repository::{ContentRepository, DeleteInterrupted, StoreError, StoreResult};

use crate::Database;
use crate::models::{CommentRow, CompanyRow, ContentRow};
use crate::queries::{format_timestamp, parse_timestamp};

impl Database {
    /// Run a blocking query off the async runtime, mapping failures to [`StoreError`].
    fn blocking<F, T>(&self, f: F) -> BoxFuture<'static, StoreResult<T>>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || f(&db))
                .await
                .map_err(|e| {
                    error!("spawn_blocking join error: {}", e);
                    StoreError::Unavailable(e.to_string())
                })?
                .map_err(store_error)
        })
    }
}

impl ContentRepository for Database {
    fn find_created_after(&self, after: DateTime<Utc>) -> BoxFuture<'_, StoreResult<Vec<ContentItem>>> {
        let after = format_timestamp(&after);
        self.blocking(move |db| db.content_created_after(&after)?.into_iter().map(content_item).collect())
    }

    fn find_content(&self, id: ContentId) -> BoxFuture<'_, StoreResult<Option<ContentItem>>> {
        self.blocking(move |db| db.get_content(id.0)?.map(content_item).transpose())
    }

    fn list_content(&self) -> BoxFuture<'_, StoreResult<Vec<ContentItem>>> {
        self.blocking(|db| db.all_content()?.into_iter().map(content_item).collect())
    }

    fn list_content_by_group(&self, group_id: i64) -> BoxFuture<'_, StoreResult<Vec<ContentItem>>> {
        self.blocking(move |db| {
            db.content_in_group(group_id)?
                .into_iter()
                .map(content_item)
                .collect()
        })
    }

    fn insert_content(&self, item: NewContentItem) -> BoxFuture<'_, StoreResult<ContentItem>> {
        self.blocking(move |db| {
            let created_at = format_timestamp(&item.created_at);
            let id = db.store_content(
                &item.title,
                &item.body,
                item.attachment.as_deref(),
                item.group_id,
                &created_at,
            )?;
            Ok(ContentItem {
                id: ContentId(id),
                title: item.title,
                body: item.body,
                attachment: item.attachment,
                group_id: item.group_id,
                // Read back at stored precision so scans compare equal values.
                created_at: parse_timestamp(&created_at)?,
            })
        })
    }

    fn list_companies(&self) -> BoxFuture<'_, StoreResult<Vec<Company>>> {
        self.blocking(|db| Ok(db.all_companies()?.into_iter().map(company).collect()))
    }

    fn find_company(&self, id: i64) -> BoxFuture<'_, StoreResult<Option<Company>>> {
        self.blocking(move |db| Ok(db.get_company(id)?.map(company)))
    }

    fn insert_company(&self, new: NewCompany) -> BoxFuture<'_, StoreResult<Company>> {
        self.blocking(move |db| {
            let id = db.store_company(&new.title, new.image.as_deref())?;
            Ok(Company {
                id,
                title: new.title,
                image: new.image,
            })
        })
    }

    fn find_comment(&self, id: CommentId) -> BoxFuture<'_, StoreResult<Option<Comment>>> {
        self.blocking(move |db| db.get_comment(id.0)?.map(comment).transpose())
    }

    fn find_children(&self, id: CommentId) -> BoxFuture<'_, StoreResult<Vec<Comment>>> {
        self.blocking(move |db| db.child_comments(id.0)?.into_iter().map(comment).collect())
    }

    fn list_comments(&self, content_id: ContentId) -> BoxFuture<'_, StoreResult<Vec<Comment>>> {
        self.blocking(move |db| {
            db.comments_for_content(content_id.0)?
                .into_iter()
                .map(comment)
                .collect()
        })
    }

    fn insert_comment(&self, new: NewComment) -> BoxFuture<'_, StoreResult<Comment>> {
        self.blocking(move |db| {
            let posted_at = format_timestamp(&new.posted_at);
            let id = db.store_comment(
                new.content_id.0,
                new.parent_id.map(|p| p.0),
                &new.author,
                &new.body,
                &posted_at,
            )?;
            Ok(Comment {
                id: CommentId(id),
                content_id: new.content_id,
                parent_id: new.parent_id,
                author: new.author,
                body: new.body,
                posted_at: parse_timestamp(&posted_at)?,
            })
        })
    }

    fn delete_comments(&self, ids: Vec<CommentId>) -> BoxFuture<'_, Result<usize, DeleteInterrupted>> {
        let raw: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let work = self.blocking(move |db| db.remove_comments(&raw));
        Box::pin(async move {
            // The whole batch is one transaction, so a failure removed nothing.
            work.await.map_err(|source| DeleteInterrupted { removed: 0, source })
        })
    }
}

fn company(row: CompanyRow) -> Company {
    Company {
        id: row.id,
        title: row.title,
        image: row.image,
    }
}

fn content_item(row: ContentRow) -> anyhow::Result<ContentItem> {
    Ok(ContentItem {
        id: ContentId(row.id),
        title: row.title,
        body: row.body,
        attachment: row.attachment,
        group_id: row.group_id,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

fn comment(row: CommentRow) -> anyhow::Result<Comment> {
    Ok(Comment {
        id: CommentId(row.id),
        content_id: ContentId(row.content_id),
        parent_id: row.parent_id.map(CommentId),
        author: row.author,
        body: row.body,
        posted_at: parse_timestamp(&row.posted_at)?,
    })
}

fn store_error(err: anyhow::Error) -> StoreError {
    match err.downcast_ref::<rusqlite::Error>() {
        Some(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
            StoreError::Constraint(e.to_string())
        }
        _ => StoreError::Unavailable(err.to_string()),
    }
}
