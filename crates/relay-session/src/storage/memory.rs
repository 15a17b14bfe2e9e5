//! In-memory document storage.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use relay_core::traits::{DocumentKey, DocumentStore, StorageError};

/// In-memory storage implementation.
///
/// Useful for tests and single-process deployments.
/// Data is lost on restart.
#[derive(Default)]
pub struct MemoryStorage {
    documents: RwLock<HashMap<DocumentKey, Vec<u8>>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStorage {
    async fn get(&self, key: DocumentKey) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .documents
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .get(&key)
            .cloned())
    }

    async fn put(&self, key: DocumentKey, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.documents
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .insert(key, bytes);
        Ok(())
    }
}
