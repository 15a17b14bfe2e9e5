//! The single error channel of an exchange.

use relay_core::{RunStatus, thread::RunId, traits::BackendError};
use thiserror::Error;

/// Why an exchange produced no reply.
///
/// Terminal run failures and backend call failures share this type so callers
/// branch on one `Result`.
#[derive(Debug, Clone, Error)]
pub enum DialogError {
    #[error("Run {run_id} ended as {status}: {reason}")]
    RunFailed {
        run_id: RunId,
        status: RunStatus,
        reason: String,
    },
    #[error("Run {run_id} still {status} after {polls} polls")]
    PollLimit {
        run_id: RunId,
        status: RunStatus,
        polls: u32,
    },
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl DialogError {
    /// Short text suitable for showing to the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::RunFailed { status, reason, .. } => {
                format!("⚠️ The assistant could not finish ({status}): {reason}")
            }
            Self::PollLimit { .. } => {
                "⚠️ The assistant is taking too long. Please try again.".to_string()
            }
            Self::Backend(BackendError::RequiresAction { .. }) => {
                "⚠️ The assistant tried to call a tool, which is not supported here.".to_string()
            }
            Self::Backend(_) => "⚠️ An error occurred. Please try again.".to_string(),
        }
    }
}
