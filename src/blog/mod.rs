pub mod repository;
pub mod upload;

use crate::error::{AppError, AppResult};
use crate::state::DbPool;
use upload::UploadStore;

/// A file part submitted with a new post.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub title: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

pub fn require_title(title: &str) -> AppResult<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title is required.".into()));
    }
    Ok(title)
}

pub fn require_body(body: &str) -> AppResult<&str> {
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::Validation("Body is required.".into()));
    }
    Ok(body)
}

/// Create a post and, if one was supplied, attach its file.
///
/// Input is validated before anything is written. The post is created first;
/// if storing or recording the attachment then fails, the file and the post
/// are removed again and the original error is returned.
pub async fn publish(
    pool: &DbPool,
    uploads: &UploadStore,
    author_id: i64,
    new_post: NewPost,
) -> AppResult<i64> {
    let title = require_title(&new_post.title)?;

    if let Some(attachment) = &new_post.attachment {
        upload::check_allowed(&attachment.filename)?;
    }

    let post_id = {
        let conn = pool.get()?;
        repository::create_post(&conn, title, &new_post.body, author_id)?
    };

    let Some(attachment) = new_post.attachment else {
        return Ok(post_id);
    };

    let name = match upload::stored_name(post_id, &attachment.filename) {
        Ok(name) => name,
        Err(e) => {
            discard_post(pool, post_id)?;
            return Err(e);
        }
    };

    if let Err(e) = attach(pool, uploads, post_id, &name, &attachment.data).await {
        tracing::warn!(post_id, "Attaching {} failed, removing post: {}", name, e);
        if let Err(cleanup) = uploads.remove(&name).await {
            tracing::warn!("Could not remove {}: {}", name, cleanup);
        }
        discard_post(pool, post_id)?;
        return Err(e);
    }

    Ok(post_id)
}

fn discard_post(pool: &DbPool, post_id: i64) -> AppResult<()> {
    let conn = pool.get()?;
    repository::delete_post(&conn, post_id)?;
    Ok(())
}

async fn attach(
    pool: &DbPool,
    uploads: &UploadStore,
    post_id: i64,
    name: &str,
    data: &[u8],
) -> AppResult<()> {
    uploads.save(name, data).await?;
    let conn = pool.get()?;
    repository::attach_image(&conn, post_id, name)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;

    fn setup() -> (DbPool, UploadStore, i64, TempDir) {
        let tmp = TempDir::new().unwrap();
        let pool = db::create_pool(&tmp.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO user (username, password) VALUES ('alice', 'hash')",
            [],
        )
        .unwrap();
        let uid = conn.last_insert_rowid();
        let uploads = UploadStore::new(tmp.path().join("uploads"));
        (pool, uploads, uid, tmp)
    }

    fn counts(pool: &DbPool) -> (i64, i64) {
        let conn = pool.get().unwrap();
        let posts = conn
            .query_row("SELECT COUNT(*) FROM post", [], |r| r.get(0))
            .unwrap();
        let images = conn
            .query_row("SELECT COUNT(*) FROM post_image", [], |r| r.get(0))
            .unwrap();
        (posts, images)
    }

    #[test]
    fn require_title_trims_and_rejects_blank() {
        assert_eq!(require_title("  Hello ").unwrap(), "Hello");
        assert!(matches!(require_title("   "), Err(AppError::Validation(_))));
    }

    #[test]
    fn require_body_rejects_blank() {
        assert_eq!(require_body("nice post").unwrap(), "nice post");
        match require_body("") {
            Err(AppError::Validation(msg)) => assert_eq!(msg, "Body is required."),
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn publish_without_attachment() {
        let (pool, uploads, uid, _tmp) = setup();

        let id = publish(
            &pool,
            &uploads,
            uid,
            NewPost {
                title: "Hello".into(),
                body: "World".into(),
                attachment: None,
            },
        )
        .await
        .unwrap();

        let conn = pool.get().unwrap();
        let post = repository::get_post(&conn, id, uid, true).unwrap();
        assert_eq!(post.title, "Hello");
        assert_eq!(counts(&pool), (1, 0));
    }

    #[tokio::test]
    async fn publish_with_attachment_stores_file_and_row() {
        let (pool, uploads, uid, _tmp) = setup();

        let id = publish(
            &pool,
            &uploads,
            uid,
            NewPost {
                title: "Cat".into(),
                body: String::new(),
                attachment: Some(Attachment {
                    filename: "my cat.png".into(),
                    data: b"\x89PNG".to_vec(),
                }),
            },
        )
        .await
        .unwrap();

        let conn = pool.get().unwrap();
        let images = repository::list_post_images(&conn, id).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].name, format!("{}_my_cat.png", id));
        let stored = uploads.dir().join(&images[0].name);
        assert_eq!(std::fs::read(stored).unwrap(), b"\x89PNG");
    }

    #[tokio::test]
    async fn publish_with_empty_title_writes_nothing() {
        let (pool, uploads, uid, _tmp) = setup();

        let err = publish(&pool, &uploads, uid, NewPost::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(counts(&pool), (0, 0));
    }

    #[tokio::test]
    async fn publish_with_disallowed_extension_writes_nothing() {
        let (pool, uploads, uid, _tmp) = setup();

        let err = publish(
            &pool,
            &uploads,
            uid,
            NewPost {
                title: "Free stuff".into(),
                body: String::new(),
                attachment: Some(Attachment {
                    filename: "setup.exe".into(),
                    data: b"MZ".to_vec(),
                }),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::UploadRejected(_)));
        assert_eq!(counts(&pool), (0, 0));
        assert!(!uploads.dir().exists());
    }

    #[tokio::test]
    async fn publish_rolls_back_post_when_file_write_fails() {
        let (pool, _uploads, uid, tmp) = setup();
        // A regular file where the upload directory should be
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let uploads = UploadStore::new(blocker);

        let err = publish(
            &pool,
            &uploads,
            uid,
            NewPost {
                title: "Doomed".into(),
                body: String::new(),
                attachment: Some(Attachment {
                    filename: "a.txt".into(),
                    data: b"hi".to_vec(),
                }),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Io(_)));
        assert_eq!(counts(&pool), (0, 0));
    }
}
