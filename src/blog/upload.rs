use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Extensions accepted for post attachments, compared lowercase.
pub const ALLOWED_EXTENSIONS: &[&str] = &["txt", "pdf", "png", "jpg", "jpeg", "gif"];

/// Names Windows refuses to create regardless of extension.
const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "AUX", "COM1", "COM2", "COM3", "COM4", "LPT1", "LPT2", "LPT3", "PRN", "NUL",
];

/// Lowercased extension of `filename`, if it has one.
pub fn extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

pub fn allowed_file(filename: &str) -> bool {
    extension(filename)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Reduce an uploaded filename to something safe to join onto the upload
/// directory: path separators become spaces, whitespace runs become `_`,
/// anything outside `[A-Za-z0-9_.-]` is dropped and leading/trailing `.`
/// and `_` are stripped. May return an empty string.
pub fn secure_filename(filename: &str) -> String {
    let spaced: String = filename
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let trimmed = kept.trim_matches(|c| c == '.' || c == '_').to_string();

    let stem = trimmed.split('.').next().unwrap_or("").to_ascii_uppercase();
    if WINDOWS_DEVICE_NAMES.contains(&stem.as_str()) {
        return format!("_{}", trimmed);
    }

    trimmed
}

pub fn check_allowed(filename: &str) -> AppResult<()> {
    if !allowed_file(filename) {
        return Err(AppError::UploadRejected(format!(
            "File type not allowed: {}. Allowed types are {}.",
            filename,
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }
    Ok(())
}

/// Check an uploaded filename against the allow-list and produce the name it
/// is stored under for `post_id`.
pub fn stored_name(post_id: i64, original: &str) -> AppResult<String> {
    check_allowed(original)?;

    let ext = extension(original).unwrap_or_default();
    let safe = secure_filename(original);
    // Sanitising can eat the whole stem or the extension (non-ASCII names)
    let safe = if allowed_file(&safe) {
        safe
    } else {
        format!("upload.{}", ext)
    };

    Ok(format!("{}_{}", post_id, safe))
}

/// Files attached to posts, kept flat in one directory.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a stored name to its path. Refuses anything that is not
    /// already a sanitised bare filename.
    pub fn path_for(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || secure_filename(name) != name {
            return None;
        }
        Some(self.dir.join(name))
    }

    pub async fn save(&self, name: &str, data: &[u8]) -> AppResult<PathBuf> {
        let path = self
            .path_for(name)
            .ok_or_else(|| AppError::UploadRejected(format!("Invalid file name: {}", name)))?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, data).await?;
        tracing::info!("Stored upload {} ({} bytes)", name, data.len());
        Ok(path)
    }

    /// Remove a stored file. A file that is already gone is not an error.
    pub async fn remove(&self, name: &str) -> AppResult<()> {
        let Some(path) = self.path_for(name) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
