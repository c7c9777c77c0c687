use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (articles and comments)");
        conn.execute_batch(
            "
            CREATE TABLE content_items (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                title       TEXT NOT NULL,
                body        TEXT NOT NULL,
                attachment  BLOB,
                group_id    INTEGER,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_content_created
                ON content_items(created_at, id);

            CREATE INDEX idx_content_group
                ON content_items(group_id);

            CREATE TABLE comments (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                content_id  INTEGER NOT NULL REFERENCES content_items(id),
                parent_id   INTEGER REFERENCES comments(id),
                author      TEXT NOT NULL,
                body        TEXT NOT NULL,
                posted_at   TEXT NOT NULL
            );

            CREATE INDEX idx_comments_content
                ON comments(content_id, posted_at);

            CREATE INDEX idx_comments_parent
                ON comments(parent_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (companies)");
        conn.execute_batch(
            "
            CREATE TABLE companies (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                title   TEXT NOT NULL,
                image   BLOB
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
