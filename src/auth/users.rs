use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::db::models::User;
use crate::error::{AppError, AppResult};

/// Insert a user with an already-hashed password. A taken username is a
/// validation error, not a database failure.
pub fn create_user(conn: &Connection, username: &str, password_hash: &str) -> AppResult<i64> {
    let result = conn.execute(
        "INSERT INTO user (username, password) VALUES (?1, ?2)",
        params![username, password_hash],
    );

    match result {
        Ok(_) => {
            let id = conn.last_insert_rowid();
            tracing::info!(user_id = id, "Registered user {}", username);
            Ok(id)
        }
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(AppError::Validation(format!(
                "User {} is already registered.",
                username
            )))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn find_by_username(conn: &Connection, username: &str) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, username, password, created FROM user WHERE username = ?1",
            params![username],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                    created: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}
