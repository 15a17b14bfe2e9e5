//! Files stored with the completion backend.

use serde::{Deserialize, Serialize};

/// A file uploaded to the backend for use by persona tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    /// Backend file id.
    pub id: String,
    /// Name the file was uploaded under.
    pub filename: String,
    /// Size in bytes.
    #[serde(default)]
    pub bytes: u64,
    /// Upload timestamp (Unix epoch seconds).
    pub created_at: i64,
    /// Intended use, such as `assistants`.
    #[serde(default)]
    pub purpose: String,
}
