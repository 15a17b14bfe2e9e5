//! Document storage implementations and typed JSON access.

#[cfg(feature = "json-file")]
pub mod json_file;
#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "json-file")]
pub use json_file::JsonFileStorage;
#[cfg(feature = "memory")]
pub use memory::MemoryStorage;

use relay_core::traits::{DocumentKey, DocumentStore, StorageError};
use serde::{Serialize, de::DeserializeOwned};

/// Read and decode a JSON document.
///
/// # Errors
/// Returns `StorageError::Corrupt` if the document exists but does not decode.
pub async fn load_json<T, D>(store: &D, key: DocumentKey) -> Result<Option<T>, StorageError>
where
    T: DeserializeOwned,
    D: DocumentStore + ?Sized,
{
    let Some(bytes) = store.get(key).await? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes).map(Some).map_err(|source| {
        tracing::error!(%key, "corrupt document: {source}");
        StorageError::Corrupt { key, source }
    })
}

/// Encode and write a JSON document, replacing any previous one.
///
/// # Errors
/// Returns error if encoding or the write fails.
pub async fn save_json<T, D>(store: &D, key: DocumentKey, value: &T) -> Result<(), StorageError>
where
    T: Serialize + ?Sized + Sync,
    D: DocumentStore + ?Sized,
{
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StorageError::Internal(e.to_string()))?;
    store.put(key, bytes).await
}
