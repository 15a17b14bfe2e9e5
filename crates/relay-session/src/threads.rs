//! Per-user list of backend threads.

use std::sync::Arc;

use relay_core::{
    Thread,
    thread,
    traits::{DocumentKey, DocumentKind, DocumentStore, StorageError, UserId},
};

use crate::storage::{load_json, save_json};

/// Owns the thread list of every user; the newest thread is the current one.
pub struct ThreadIndex<D: ?Sized> {
    store: Arc<D>,
}

impl<D> ThreadIndex<D>
where
    D: DocumentStore + ?Sized,
{
    #[must_use]
    pub const fn new(store: Arc<D>) -> Self {
        Self { store }
    }

    /// All threads of the user, empty when none were recorded.
    ///
    /// # Errors
    /// Returns error if the document cannot be read or is corrupt.
    pub async fn threads(&self, user_id: UserId) -> Result<Vec<Thread>, StorageError> {
        Ok(load_json(&*self.store, key(user_id)).await?.unwrap_or_default())
    }

    /// The thread with the greatest `created_at`.
    ///
    /// # Errors
    /// Returns error if the document cannot be read or is corrupt.
    pub async fn current(&self, user_id: UserId) -> Result<Option<Thread>, StorageError> {
        Ok(thread::current(&self.threads(user_id).await?).cloned())
    }

    /// Record a new thread.
    ///
    /// # Errors
    /// Returns error if reading or writing fails.
    pub async fn push(&self, user_id: UserId, thread: Thread) -> Result<(), StorageError> {
        let mut threads = self.threads(user_id).await?;
        threads.push(thread);
        save_json(&*self.store, key(user_id), &threads).await
    }
}

const fn key(user_id: UserId) -> DocumentKey {
    DocumentKey::new(DocumentKind::Threads, user_id)
}
