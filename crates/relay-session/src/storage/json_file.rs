//! One JSON file per document under a directory.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use relay_core::traits::{DocumentKey, DocumentStore, StorageError};
use tokio::io::AsyncWriteExt;

/// File-backed storage writing `<dir>/<prefix><user>.json`.
///
/// Writes go to a temporary file that is flushed to disk and then renamed
/// over the target, so a reader never sees a half-written document, even
/// after a crash. The directory is created on first write.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for `key`.
    #[must_use]
    pub fn path(&self, key: DocumentKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.name()))
    }
}

#[async_trait]
impl DocumentStore for JsonFileStorage {
    async fn get(&self, key: DocumentKey) -> Result<Option<Vec<u8>>, StorageError> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { key, source }),
        }
    }

    async fn put(&self, key: DocumentKey, bytes: Vec<u8>) -> Result<(), StorageError> {
        let io = |source| StorageError::Io { key, source };
        tokio::fs::create_dir_all(&self.dir).await.map_err(io)?;

        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        write_synced(&tmp, &bytes).await.map_err(io)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io)?;
        tracing::debug!(%key, path = %path.display(), "document written");
        Ok(())
    }
}

/// Write `bytes` to `path` and fsync before returning.
async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}
