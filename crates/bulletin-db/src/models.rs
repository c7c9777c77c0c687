//! Database row types. Timestamps stay as stored RFC 3339 text.

pub struct ContentRow {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub attachment: Option<Vec<u8>>,
    pub group_id: Option<i64>,
    pub created_at: String,
}

pub struct CommentRow {
    pub id: i64,
    pub content_id: i64,
    pub parent_id: Option<i64>,
    pub author: String,
    pub body: String,
    pub posted_at: String,
}

pub struct CompanyRow {
    pub id: i64,
    pub title: String,
    pub image: Option<Vec<u8>>,
}
