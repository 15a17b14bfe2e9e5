//! Ordered per-user message log.

use std::sync::Arc;

use relay_core::{
    Message,
    traits::{DocumentKey, DocumentKind, DocumentStore, StorageError, UserId},
};

use crate::storage::{load_json, save_json};

/// Owns the session document of every user.
pub struct SessionStore<D: ?Sized> {
    store: Arc<D>,
}

impl<D> SessionStore<D>
where
    D: DocumentStore + ?Sized,
{
    #[must_use]
    pub const fn new(store: Arc<D>) -> Self {
        Self { store }
    }

    /// The persisted log, empty when the user has none yet.
    ///
    /// # Errors
    /// Returns error if the document cannot be read or is corrupt.
    pub async fn get_session(&self, user_id: UserId) -> Result<Vec<Message>, StorageError> {
        Ok(load_json(&*self.store, key(user_id)).await?.unwrap_or_default())
    }

    /// Replace the log wholesale.
    ///
    /// # Errors
    /// Returns error if the write fails.
    pub async fn save_session(&self, user_id: UserId, messages: &[Message]) -> Result<(), StorageError> {
        save_json(&*self.store, key(user_id), messages).await
    }

    /// Append messages after the persisted ones.
    ///
    /// Not atomic with respect to other writers; hold the user's lock.
    ///
    /// # Errors
    /// Returns error if reading or writing fails.
    pub async fn append(
        &self,
        user_id: UserId,
        messages: impl IntoIterator<Item = Message> + Send,
    ) -> Result<(), StorageError> {
        let mut session = self.get_session(user_id).await?;
        session.extend(messages);
        self.save_session(user_id, &session).await
    }

    /// Overwrite the log with an empty one.
    ///
    /// # Errors
    /// Returns error if the write fails.
    pub async fn reset(&self, user_id: UserId) -> Result<(), StorageError> {
        self.save_session(user_id, &[]).await
    }
}

const fn key(user_id: UserId) -> DocumentKey {
    DocumentKey::new(DocumentKind::Session, user_id)
}

#[cfg(test)]
mod tests {
    use relay_core::traits::DocumentStore;

    use super::*;
    use crate::storage::MemoryStorage;

    fn store() -> (Arc<MemoryStorage>, SessionStore<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (Arc::clone(&storage), SessionStore::new(storage))
    }

    #[tokio::test]
    async fn test_missing_session_is_empty() {
        let (_, sessions) = store();
        assert!(sessions.get_session(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_get_preserves_order() {
        let (_, sessions) = store();
        let log = vec![
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("hi"),
        ];

        sessions.save_session(9, &log).await.unwrap();

        assert_eq!(sessions.get_session(9).await.unwrap(), log);
        assert!(sessions.get_session(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_and_reset() {
        let (_, sessions) = store();
        sessions.append(3, [Message::user("a")]).await.unwrap();
        sessions
            .append(3, [Message::user("b"), Message::assistant("c")])
            .await
            .unwrap();
        assert_eq!(sessions.get_session(3).await.unwrap().len(), 3);

        sessions.reset(3).await.unwrap();
        assert!(sessions.get_session(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error() {
        let (storage, sessions) = store();
        storage.put(key(5), b"{not json".to_vec()).await.unwrap();

        let err = sessions.get_session(5).await.unwrap_err();

        assert!(matches!(err, StorageError::Corrupt { key: k, .. } if k == key(5)));
    }
}
