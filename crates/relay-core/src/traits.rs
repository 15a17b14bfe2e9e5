//! Core traits for storage, the completion backend and the chat channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    file::StoredFile,
    persona::{Persona, PersonaParams},
    stream::RunStream,
    thread::{Run, Thread, ThreadMessage},
};

/// End-user identifier.
pub type UserId = i64;

/// Kind of per-user document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    /// Ordered message log.
    Session,
    /// Persona list.
    Settings,
    /// Thread index.
    Threads,
}

impl DocumentKind {
    /// File name prefix used by file-backed stores.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Session => "",
            Self::Settings => "a-",
            Self::Threads => "t-",
        }
    }
}

/// Address of one persisted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    /// Which of the user's documents.
    pub kind: DocumentKind,
    /// Owner of the document.
    pub user_id: UserId,
}

impl DocumentKey {
    #[must_use]
    pub const fn new(kind: DocumentKind, user_id: UserId) -> Self {
        Self { kind, user_id }
    }

    /// Stable name such as `a-42`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}{}", self.kind.prefix(), self.user_id)
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {key}: {source}")]
    Io {
        key: DocumentKey,
        #[source]
        source: std::io::Error,
    },
    #[error("Corrupt document {key}: {source}")]
    Corrupt {
        key: DocumentKey,
        #[source]
        source: serde_json::Error,
    },
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Key-value capability behind the typed stores.
///
/// A write replaces the whole document atomically; reading a missing key
/// yields `None`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read the raw document.
    async fn get(&self, key: DocumentKey) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the raw document.
    async fn put(&self, key: DocumentKey, bytes: Vec<u8>) -> Result<(), StorageError>;
}

/// Completion backend error.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Stream error: {0}")]
    Stream(String),
    /// The run stopped to wait for tool outputs, which the relay never submits.
    #[error("Run {run_id} requires tool outputs")]
    RequiresAction { run_id: String },
}

/// Trait for remote completion backends running personas on threads.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Create an empty thread.
    async fn create_thread(&self) -> Result<Thread, BackendError>;

    /// Create a persona on the backend.
    async fn create_assistant(&self, params: &PersonaParams) -> Result<Persona, BackendError>;

    /// Append a user message to a thread.
    async fn create_message(&self, thread_id: &str, text: &str) -> Result<(), BackendError>;

    /// Start a run of `persona_id` on `thread_id`.
    async fn create_run(&self, thread_id: &str, persona_id: &str) -> Result<Run, BackendError>;

    /// Fetch the current state of a run.
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, BackendError>;

    /// Cancel a run that has not finished.
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), BackendError>;

    /// Messages of `thread_id` produced by `run_id`, oldest first.
    ///
    /// Must see the newest messages of the thread regardless of its length.
    async fn list_messages(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<Vec<ThreadMessage>, BackendError>;

    /// Start a run and stream its output.
    async fn stream_run(&self, thread_id: &str, persona_id: &str) -> Result<RunStream, BackendError>;

    /// Every persona defined on the backend account, oldest first.
    async fn list_assistants(&self) -> Result<Vec<Persona>, BackendError>;

    /// Files uploaded to the backend account.
    async fn list_files(&self) -> Result<Vec<StoredFile>, BackendError>;
}

/// Handle of a message sent on the chat channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    /// Chat the message was sent to.
    pub chat_id: UserId,
    /// Transport-assigned id, unique within the chat.
    pub message_id: i64,
}

/// Chat transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Channel closed")]
    Closed,
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Outbound side of the chat channel.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a new message to `user_id`.
    async fn reply(&self, user_id: UserId, text: &str) -> Result<MessageRef, TransportError>;

    /// Replace the text of a sent message.
    async fn edit_reply(&self, message: &MessageRef, text: &str) -> Result<(), TransportError>;

    /// Remove a sent message.
    async fn delete_reply(&self, message: &MessageRef) -> Result<(), TransportError>;
}

/// A task list of the external task provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskList {
    /// Provider-assigned list id.
    pub id: String,
    /// Display title.
    pub title: String,
}

/// Completion state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    NeedsAction,
    Completed,
}

/// One task of a task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    /// Task text.
    pub title: String,
    /// Whether the task is done.
    pub status: TaskStatus,
}

/// Task provider error.
#[derive(Debug, Error)]
pub enum TaskProviderError {
    #[error("Not authorized: {0}")]
    Unauthorized(String),
    #[error("Task provider error: {0}")]
    Request(String),
}

/// External task-list source.
#[async_trait]
pub trait TaskListProvider: Send + Sync {
    async fn list_task_lists(&self) -> Result<Vec<TaskList>, TaskProviderError>;

    async fn list_tasks(&self, list_id: &str) -> Result<Vec<TaskItem>, TaskProviderError>;
}
