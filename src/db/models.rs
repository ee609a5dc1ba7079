use rusqlite::Row;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created: String,
}

/// A post joined with its author's username.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub created: String,
    pub author_id: i64,
    pub username: String,
}

impl Post {
    pub const COLUMNS: &'static str =
        "p.id, p.title, p.body, p.created, p.author_id, u.username";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            body: row.get(2)?,
            created: row.get(3)?,
            author_id: row.get(4)?,
            username: row.get(5)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostImage {
    pub id: i64,
    pub post_id: i64,
    pub name: String,
}

/// A comment joined with the commenter's username.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostComment {
    pub id: i64,
    pub post_id: i64,
    pub body: String,
    pub created: String,
    pub user_id: i64,
    pub username: String,
}

impl PostComment {
    pub const COLUMNS: &'static str =
        "c.id, c.post_id, c.body, c.created, c.user_id, u.username";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            post_id: row.get(1)?,
            body: row.get(2)?,
            created: row.get(3)?,
            user_id: row.get(4)?,
            username: row.get(5)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostLike {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
}
