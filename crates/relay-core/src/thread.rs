//! Backend conversation threads and runs.

use serde::{Deserialize, Serialize};

use crate::message::Role;

/// Thread identifier as issued by the completion backend.
pub type ThreadId = String;

/// Run identifier as issued by the completion backend.
pub type RunId = String;

/// A server-side conversation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    /// Backend thread id.
    pub id: ThreadId,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: i64,
    /// Vector stores attached for file search.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vector_store_ids: Vec<String>,
}

/// The thread with the greatest `created_at`.
///
/// Ties resolve to the later entry in the list.
#[must_use]
pub fn current(threads: &[Thread]) -> Option<&Thread> {
    threads.iter().max_by_key(|t| t.created_at)
}

/// Status of a run.
///
/// `Queued` and `InProgress` are the normal transient states; the backend may
/// also report `Cancelling` or `RequiresAction`, which keep a run alive.
/// `Incomplete` ends a run early, for example on a token limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether the run can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Expired | Self::Incomplete
        )
    }

    /// Terminal and not `Completed`.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Cancelled | Self::Expired | Self::Incomplete
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Incomplete => "incomplete",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure details reported by the backend for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Machine-readable error code, such as `rate_limit_exceeded`.
    pub code: String,
    /// Human-readable reason.
    pub message: String,
}

/// One asynchronous execution of a persona against a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Backend run id.
    pub id: RunId,
    /// Thread the run executes against.
    pub thread_id: ThreadId,
    /// Persona being run.
    pub assistant_id: String,
    /// Latest known status.
    pub status: RunStatus,
    /// Set when the run ended unsuccessfully.
    #[serde(default)]
    pub last_error: Option<RunFailure>,
}

/// A message as stored on a backend thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    /// Backend message id.
    pub id: String,
    /// Author of the message.
    pub role: Role,
    /// Run that produced the message; `None` for user messages.
    #[serde(default)]
    pub run_id: Option<RunId>,
    pub created_at: i64,
    /// Text parts in order; non-text parts are dropped by the backend adapter.
    #[serde(default)]
    pub text: Vec<String>,
}

impl ThreadMessage {
    /// Text parts joined with newlines, `None` when the message has no text.
    #[must_use]
    pub fn joined_text(&self) -> Option<String> {
        if self.text.is_empty() {
            None
        } else {
            Some(self.text.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(id: &str, created_at: i64) -> Thread {
        Thread {
            id: id.to_string(),
            created_at,
            vector_store_ids: Vec::new(),
        }
    }

    #[test]
    fn test_current_thread_is_newest() {
        let threads = vec![thread("a", 10), thread("b", 30), thread("c", 20)];
        assert_eq!(current(&threads).map(|t| t.id.as_str()), Some("b"));
        assert!(current(&[]).is_none());
    }

    #[test]
    fn test_terminal_states() {
        use RunStatus::*;
        for status in [Queued, InProgress, RequiresAction, Cancelling, Unknown] {
            assert!(!status.is_terminal(), "{status} must not be terminal");
        }
        for status in [Failed, Cancelled, Expired, Incomplete] {
            assert!(status.is_terminal() && status.is_failure());
        }
        assert!(Completed.is_terminal() && !Completed.is_failure());
    }

    #[test]
    fn test_unknown_status_decodes() {
        let status: RunStatus = serde_json::from_str("\"paused_for_review\"").unwrap();
        assert_eq!(status, RunStatus::Unknown);
        let status: RunStatus = serde_json::from_str("\"incomplete\"").unwrap();
        assert_eq!(status, RunStatus::Incomplete);
        let status: RunStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(status, RunStatus::InProgress);
    }
}
