//! Profile photo storage.

use async_trait::async_trait;
use service_core::error::AppError;
use std::path::PathBuf;
use tokio::fs;

#[async_trait]
pub trait PhotoStorage: Send + Sync {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), AppError>;
}

/// Keys are plain file names: ASCII letters, digits, `.`, `_` and `-`,
/// never starting with a dot.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Photos as files under one directory, served back as static files.
pub struct LocalPhotoStorage {
    base_path: PathBuf,
}

impl LocalPhotoStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn path(&self, key: &str) -> Result<PathBuf, AppError> {
        if !is_valid_key(key) {
            return Err(AppError::bad_request(format!("Invalid photo key: {}", key)));
        }
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl PhotoStorage for LocalPhotoStorage {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError> {
        let path = self.path(key)?;
        fs::create_dir_all(&self.base_path).await?;
        fs::write(&path, data).await?;
        tracing::debug!(path = %path.display(), "Stored profile photo");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = self.path(key)?;
        if fs::try_exists(&path).await? {
            fs::remove_file(path).await?;
        }
        Ok(())
    }
}
