use crate::Database;
use crate::models::{CommentRow, CompanyRow, ContentRow};
use anyhow::{Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Row};

const CONTENT_COLUMNS: &str = "id, title, body, attachment, group_id, created_at";
const COMMENT_COLUMNS: &str = "id, content_id, parent_id, author, body, posted_at";

/// Fixed-width RFC 3339 so that text comparison in SQL matches time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| anyhow!("Corrupt timestamp '{}': {}", raw, e))
}

impl Database {
    // -- Companies --

    pub fn store_company(&self, title: &str, image: Option<&[u8]>) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO companies (title, image) VALUES (?1, ?2)",
                rusqlite::params![title, image],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_company(&self, id: i64) -> Result<Option<CompanyRow>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT id, title, image FROM companies WHERE id = ?1", [id], company_row)
                .optional()
        })
    }

    pub fn all_companies(&self) -> Result<Vec<CompanyRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, title, image FROM companies ORDER BY id")?;
            let rows = stmt
                .query_map([], company_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Content --

    pub fn store_content(
        &self,
        title: &str,
        body: &str,
        attachment: Option<&[u8]>,
        group_id: Option<i64>,
        created_at: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO content_items (title, body, attachment, group_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![title, body, attachment, group_id, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_content(&self, id: i64) -> Result<Option<ContentRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {CONTENT_COLUMNS} FROM content_items WHERE id = ?1"),
                [id],
                content_row,
            )
            .optional()
        })
    }

    pub fn all_content(&self) -> Result<Vec<ContentRow>> {
        self.with_conn(|conn| {
            query_content(
                conn,
                &format!("SELECT {CONTENT_COLUMNS} FROM content_items ORDER BY created_at, id"),
                rusqlite::params![],
            )
        })
    }

    pub fn content_in_group(&self, group_id: i64) -> Result<Vec<ContentRow>> {
        self.with_conn(|conn| {
            query_content(
                conn,
                &format!(
                    "SELECT {CONTENT_COLUMNS} FROM content_items
                     WHERE group_id = ?1
                     ORDER BY created_at, id"
                ),
                [group_id],
            )
        })
    }

    /// Strictly-after comparison: an item stamped exactly `after` is excluded.
    pub fn content_created_after(&self, after: &str) -> Result<Vec<ContentRow>> {
        self.with_conn(|conn| {
            query_content(
                conn,
                &format!(
                    "SELECT {CONTENT_COLUMNS} FROM content_items
                     WHERE created_at > ?1
                     ORDER BY created_at ASC, id ASC"
                ),
                [after],
            )
        })
    }

    // -- Comments --

    pub fn store_comment(
        &self,
        content_id: i64,
        parent_id: Option<i64>,
        author: &str,
        body: &str,
        posted_at: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (content_id, parent_id, author, body, posted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![content_id, parent_id, author, body, posted_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1"),
                [id],
                comment_row,
            )
            .optional()
        })
    }

    pub fn child_comments(&self, parent_id: i64) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            query_comments(
                conn,
                &format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE parent_id = ?1 ORDER BY id"),
                parent_id,
            )
        })
    }

    /// Newest first.
    pub fn comments_for_content(&self, content_id: i64) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            query_comments(
                conn,
                &format!(
                    "SELECT {COMMENT_COLUMNS} FROM comments
                     WHERE content_id = ?1
                     ORDER BY posted_at DESC, id DESC"
                ),
                content_id,
            )
        })
    }

    /// Deletes the comments in order inside one transaction.
    /// Returns the number of rows removed; on error nothing is removed.
    pub fn remove_comments(&self, ids: &[i64]) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            {
                let mut stmt = tx.prepare("DELETE FROM comments WHERE id = ?1")?;
                for id in ids {
                    removed += stmt.execute([id])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
    }
}

fn company_row(row: &Row<'_>) -> rusqlite::Result<CompanyRow> {
    Ok(CompanyRow {
        id: row.get(0)?,
        title: row.get(1)?,
        image: row.get(2)?,
    })
}

fn content_row(row: &Row<'_>) -> rusqlite::Result<ContentRow> {
    Ok(ContentRow {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        attachment: row.get(3)?,
        group_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn comment_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        content_id: row.get(1)?,
        parent_id: row.get(2)?,
        author: row.get(3)?,
        body: row.get(4)?,
        posted_at: row.get(5)?,
    })
}

fn query_content<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<ContentRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, content_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_comments(conn: &Connection, sql: &str, key: i64) -> Result<Vec<CommentRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([key], comment_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> String {
        format_timestamp(&Utc.timestamp_opt(secs, 0).unwrap())
    }

    #[test]
    fn test_timestamp_text_order_matches_time_order() {
        let a = format_timestamp(&Utc.timestamp_opt(100, 999_000).unwrap());
        let b = format_timestamp(&Utc.timestamp_opt(100, 1_000_000).unwrap());
        let c = format_timestamp(&Utc.timestamp_opt(101, 0).unwrap());
        assert!(a < b && b < c);
        assert_eq!(parse_timestamp(&b).unwrap(), Utc.timestamp_opt(100, 1_000_000).unwrap());
    }

    #[test]
    fn test_created_after_is_strict_and_ascending() {
        let db = Database::open_in_memory().unwrap();
        db.store_content("late", "b", None, None, &ts(300)).unwrap();
        db.store_content("edge", "b", None, None, &ts(100)).unwrap();
        db.store_content("mid", "b", None, None, &ts(200)).unwrap();

        let rows = db.content_created_after(&ts(100)).unwrap();
        let titles: Vec<_> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["mid", "late"]);
    }

    #[test]
    fn test_delete_parent_before_child_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let article = db.store_content("a", "b", None, None, &ts(1)).unwrap();
        let root = db.store_comment(article, None, "alice", "hi", &ts(2)).unwrap();
        let reply = db.store_comment(article, Some(root), "bob", "yo", &ts(3)).unwrap();

        assert!(db.remove_comments(&[root, reply]).is_err());
        // rolled back: both still present
        assert!(db.get_comment(root).unwrap().is_some());
        assert!(db.get_comment(reply).unwrap().is_some());

        assert_eq!(db.remove_comments(&[reply, root]).unwrap(), 2);
        assert!(db.get_comment(root).unwrap().is_none());
    }

    #[test]
    fn test_companies_are_listed_by_id() {
        let db = Database::open_in_memory().unwrap();
        let acme = db.store_company("Acme", Some(&[1u8, 2][..])).unwrap();
        let globex = db.store_company("Globex", None).unwrap();

        let titles: Vec<_> = db.all_companies().unwrap().into_iter().map(|c| c.title).collect();
        assert_eq!(titles, vec!["Acme", "Globex"]);
        assert_eq!(db.get_company(acme).unwrap().unwrap().image, Some(vec![1, 2]));
        assert!(db.get_company(globex + 1).unwrap().is_none());
    }

    #[test]
    fn test_comment_requires_existing_article() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.store_comment(42, None, "alice", "hi", &ts(1)).is_err());
    }
}
