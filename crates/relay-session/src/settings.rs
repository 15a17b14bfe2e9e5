//! Per-user persona lists and the activation toggle.

use std::sync::Arc;

use relay_core::{
    Persona, persona,
    traits::{DocumentKey, DocumentKind, DocumentStore, StorageError, UserId},
};
use thiserror::Error;

use crate::storage::{load_json, save_json};

/// Settings error.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("No settings for user {0}")]
    NotFound(UserId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Owns the persona list of every user.
pub struct SettingsStore<D: ?Sized> {
    store: Arc<D>,
}

impl<D> SettingsStore<D>
where
    D: DocumentStore + ?Sized,
{
    #[must_use]
    pub const fn new(store: Arc<D>) -> Self {
        Self { store }
    }

    /// The persona list, `None` when the user has never been set up.
    ///
    /// # Errors
    /// Returns error if the document cannot be read or is corrupt.
    pub async fn get_settings(&self, user_id: UserId) -> Result<Option<Vec<Persona>>, StorageError> {
        load_json(&*self.store, key(user_id)).await
    }

    /// Replace the persona list.
    ///
    /// # Errors
    /// Returns error if the write fails.
    pub async fn save_settings(&self, user_id: UserId, personas: &[Persona]) -> Result<(), StorageError> {
        save_json(&*self.store, key(user_id), personas).await
    }

    /// Activate the persona at `index` and deactivate all others.
    ///
    /// An out-of-range index saves the list with every persona deactivated.
    ///
    /// # Errors
    /// Returns `SettingsError::NotFound` if the user has no settings.
    pub async fn activate(&self, user_id: UserId, index: usize) -> Result<Vec<Persona>, SettingsError> {
        let personas = self
            .get_settings(user_id)
            .await?
            .ok_or(SettingsError::NotFound(user_id))?;

        let toggled = persona::activate(&personas, index);
        if index >= toggled.len() {
            tracing::warn!(user_id, index, "persona index out of range, all deactivated");
        }
        self.save_settings(user_id, &toggled).await?;
        Ok(toggled)
    }

    /// The activated persona, if any.
    ///
    /// # Errors
    /// Returns error if the document cannot be read or is corrupt.
    pub async fn active_persona(&self, user_id: UserId) -> Result<Option<Persona>, StorageError> {
        Ok(self
            .get_settings(user_id)
            .await?
            .and_then(|list| persona::active(&list).cloned()))
    }
}

const fn key(user_id: UserId) -> DocumentKey {
    DocumentKey::new(DocumentKind::Settings, user_id)
}
