// Data access for posts, comments, likes and images. Every function takes the
// acting user's id explicitly; nothing here knows about requests or sessions.
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::{Post, PostComment, PostImage, PostLike};
use crate::error::{AppError, AppResult};

/// Fetch a post with its author's username.
///
/// With `check_author`, only the post's author may retrieve it; anyone else
/// gets `Forbidden`.
pub fn get_post(conn: &Connection, id: i64, user_id: i64, check_author: bool) -> AppResult<Post> {
    let post = conn
        .query_row(
            &format!(
                "SELECT {} FROM post p JOIN user u ON p.author_id = u.id WHERE p.id = ?1",
                Post::COLUMNS
            ),
            params![id],
            Post::from_row,
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("Post id {} doesn't exist.", id)))?;

    if check_author && post.author_id != user_id {
        return Err(AppError::Forbidden);
    }

    Ok(post)
}

/// Fetch a comment under `post_id`. With `check_author`, only the comment's
/// author may retrieve it.
pub fn get_post_comment(
    conn: &Connection,
    comment_id: i64,
    post_id: i64,
    user_id: i64,
    check_author: bool,
) -> AppResult<PostComment> {
    let comment = conn
        .query_row(
            &format!(
                "SELECT {} FROM post_comment c JOIN user u ON c.user_id = u.id
                 WHERE c.id = ?1 AND c.post_id = ?2",
                PostComment::COLUMNS
            ),
            params![comment_id, post_id],
            PostComment::from_row,
        )
        .optional()?
        .ok_or_else(|| {
            AppError::NotFound(format!("Post comment id {} doesn't exist.", comment_id))
        })?;

    if check_author && comment.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    Ok(comment)
}

/// All posts, newest first.
pub fn list_posts(conn: &Connection) -> AppResult<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM post p JOIN user u ON p.author_id = u.id
         ORDER BY p.created DESC, p.id DESC",
        Post::COLUMNS
    ))?;

    let posts = stmt
        .query_map([], Post::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

pub fn create_post(conn: &Connection, title: &str, body: &str, author_id: i64) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO post (title, body, author_id) VALUES (?1, ?2, ?3)",
        params![title, body, author_id],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(post_id = id, author_id, "Created post");
    Ok(id)
}

/// Title and body are the only mutable fields of a post.
pub fn update_post(conn: &Connection, id: i64, title: &str, body: &str) -> AppResult<()> {
    let rows = conn.execute(
        "UPDATE post SET title = ?1, body = ?2 WHERE id = ?3",
        params![title, body, id],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("Post id {} doesn't exist.", id)));
    }
    tracing::info!(post_id = id, "Updated post");
    Ok(())
}

/// Delete a post together with its images, comments and likes. Returns the
/// stored filenames of the images that were attached so the caller can
/// remove the files.
pub fn delete_post(conn: &Connection, id: i64) -> AppResult<Vec<String>> {
    let tx = conn.unchecked_transaction()?;

    let images: Vec<String> = {
        let mut stmt = tx.prepare("SELECT name FROM post_image WHERE post_id = ?1")?;
        let names = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        names
    };

    // post_image, post_comment and post_like cascade
    let rows = tx.execute("DELETE FROM post WHERE id = ?1", params![id])?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("Post id {} doesn't exist.", id)));
    }

    tx.commit()?;
    tracing::info!(post_id = id, images = images.len(), "Deleted post");
    Ok(images)
}

pub fn attach_image(conn: &Connection, post_id: i64, name: &str) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO post_image (post_id, name) VALUES (?1, ?2)",
        params![post_id, name],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_post_images(conn: &Connection, post_id: i64) -> AppResult<Vec<PostImage>> {
    let mut stmt =
        conn.prepare("SELECT id, post_id, name FROM post_image WHERE post_id = ?1 ORDER BY id")?;
    let images = stmt
        .query_map(params![post_id], |row| {
            Ok(PostImage {
                id: row.get(0)?,
                post_id: row.get(1)?,
                name: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(images)
}

pub fn get_post_like(conn: &Connection, post_id: i64, user_id: i64) -> AppResult<Option<PostLike>> {
    let like = conn
        .query_row(
            "SELECT id, post_id, user_id FROM post_like WHERE post_id = ?1 AND user_id = ?2",
            params![post_id, user_id],
            |row| {
                Ok(PostLike {
                    id: row.get(0)?,
                    post_id: row.get(1)?,
                    user_id: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(like)
}

pub fn get_post_like_total(conn: &Connection, post_id: i64) -> AppResult<i64> {
    let total = conn.query_row(
        "SELECT COUNT(*) FROM post_like WHERE post_id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// Flip the like for (post, user) and return the new state, `true` for liked.
///
/// Runs in one transaction: delete if present, otherwise insert. The unique
/// (post_id, user_id) constraint keeps racing toggles from producing
/// duplicate rows.
pub fn toggle_like(conn: &Connection, post_id: i64, user_id: i64) -> AppResult<bool> {
    get_post(conn, post_id, user_id, false)?;

    let tx = conn.unchecked_transaction()?;
    let removed = tx.execute(
        "DELETE FROM post_like WHERE post_id = ?1 AND user_id = ?2",
        params![post_id, user_id],
    )?;
    if removed == 0 {
        tx.execute(
            "INSERT OR IGNORE INTO post_like (post_id, user_id) VALUES (?1, ?2)",
            params![post_id, user_id],
        )?;
    }
    tx.commit()?;

    let liked = removed == 0;
    tracing::debug!(post_id, user_id, liked, "Toggled like");
    Ok(liked)
}

/// Comments on a post, oldest first.
pub fn get_post_comments(conn: &Connection, post_id: i64) -> AppResult<Vec<PostComment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM post_comment c JOIN user u ON c.user_id = u.id
         WHERE c.post_id = ?1
         ORDER BY c.created ASC, c.id ASC",
        PostComment::COLUMNS
    ))?;

    let comments = stmt
        .query_map(params![post_id], PostComment::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

pub fn create_comment(conn: &Connection, post_id: i64, user_id: i64, body: &str) -> AppResult<i64> {
    get_post(conn, post_id, user_id, false)?;

    conn.execute(
        "INSERT INTO post_comment (post_id, user_id, body) VALUES (?1, ?2, ?3)",
        params![post_id, user_id, body],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(post_id, comment_id = id, user_id, "Created comment");
    Ok(id)
}

/// Delete by primary key, scoped to the post. Ownership is checked by the
/// caller through `get_post_comment`.
pub fn delete_comment(conn: &Connection, post_id: i64, comment_id: i64) -> AppResult<()> {
    let rows = conn.execute(
        "DELETE FROM post_comment WHERE id = ?1 AND post_id = ?2",
        params![comment_id, post_id],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound(format!(
            "Post comment id {} doesn't exist.",
            comment_id
        )));
    }
    tracing::info!(post_id, comment_id, "Deleted comment");
    Ok(())
}
