//! Drives one exchange against a completion backend.

use std::{sync::Arc, time::Duration};

use relay_core::{
    Role, Run, RunStatus,
    thread::RunId,
    traits::{BackendError, CompletionBackend},
};
use tokio::time::Instant;

use crate::{
    DialogError,
    aggregator::{SnapshotSink, StreamAggregator},
};

/// How often and how long to poll a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Give up after this many status reads; unbounded when `None`.
    pub max_polls: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(400),
            max_polls: None,
        }
    }
}

/// Rate limit and page size for streamed exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPolicy {
    pub snapshot_interval: Duration,
    pub chunk_limit: usize,
}

impl Default for StreamPolicy {
    fn default() -> Self {
        Self {
            snapshot_interval: Duration::from_millis(1000),
            chunk_limit: 4096,
        }
    }
}

/// Reply of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogReply {
    pub run_id: RunId,
    /// `None` when the run completed without an assistant message.
    pub text: Option<String>,
}

/// Submits messages, runs personas and collects their replies.
///
/// Futures returned here hold no local state worth cleaning up, so an
/// exchange can be cancelled by dropping it or wrapping it in
/// `tokio::time::timeout`.
pub struct RunCoordinator<B: ?Sized> {
    backend: Arc<B>,
    poll: PollPolicy,
    stream: StreamPolicy,
}

impl<B> RunCoordinator<B>
where
    B: CompletionBackend + ?Sized,
{
    /// Create a coordinator with default policies.
    #[must_use]
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            poll: PollPolicy::default(),
            stream: StreamPolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    #[must_use]
    pub const fn with_stream_policy(mut self, stream: StreamPolicy) -> Self {
        self.stream = stream;
        self
    }

    /// The backend this coordinator talks to.
    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Send `message` on `thread_id`, run `persona_id` and wait for its reply.
    ///
    /// # Errors
    /// Returns error if any backend call fails or the run ends unsuccessfully.
    pub async fn start_dialog(
        &self,
        message: &str,
        persona_id: &str,
        thread_id: &str,
    ) -> Result<DialogReply, DialogError> {
        self.backend.create_message(thread_id, message).await?;
        let run = self.backend.create_run(thread_id, persona_id).await?;
        tracing::debug!(run_id = %run.id, thread_id, persona_id, "run created");

        let run = self.wait_for_terminal(thread_id, run).await?;
        if run.status.is_failure() {
            let reason = run
                .last_error
                .map_or_else(|| run.status.to_string(), |e| e.message);
            tracing::error!(
                "Run status is '{}'. Unable to complete the request: {}",
                run.status,
                reason
            );
            return Err(DialogError::RunFailed {
                run_id: run.id,
                status: run.status,
                reason,
            });
        }

        let text = self.extract_reply(thread_id, &run.id).await?;
        Ok(DialogReply {
            run_id: run.id,
            text,
        })
    }

    /// Send `message` and stream the run's output into `sink`.
    ///
    /// Returns the full reply text once the stream ends.
    ///
    /// # Errors
    /// Returns error if a backend call fails or the stream reports one.
    pub async fn stream_dialog<S>(
        &self,
        message: &str,
        persona_id: &str,
        thread_id: &str,
        sink: &mut S,
    ) -> Result<String, DialogError>
    where
        S: SnapshotSink + ?Sized,
    {
        self.backend.create_message(thread_id, message).await?;
        let stream = self.backend.stream_run(thread_id, persona_id).await?;
        let result = StreamAggregator::new(
            self.stream.snapshot_interval,
            self.stream.chunk_limit,
            Instant::now(),
        )
        .drive(stream, sink)
        .await;

        if let Err(DialogError::Backend(BackendError::RequiresAction { run_id })) = &result {
            self.cancel(thread_id, run_id).await;
        }
        result
    }

    async fn wait_for_terminal(&self, thread_id: &str, mut run: Run) -> Result<Run, DialogError> {
        let mut polls = 0_u32;
        while !run.status.is_terminal() {
            if run.status == RunStatus::RequiresAction {
                self.cancel(thread_id, &run.id).await;
                return Err(DialogError::RunFailed {
                    run_id: run.id,
                    status: run.status,
                    reason: "the assistant asked for tool outputs".to_string(),
                });
            }
            if self.poll.max_polls.is_some_and(|max| polls >= max) {
                return Err(DialogError::PollLimit {
                    run_id: run.id,
                    status: run.status,
                    polls,
                });
            }
            tokio::time::sleep(self.poll.interval).await;
            run = self.backend.retrieve_run(thread_id, &run.id).await?;
            polls += 1;
        }
        tracing::debug!(run_id = %run.id, status = %run.status, polls, "run finished");
        Ok(run)
    }

    /// Cancel a stalled run so the thread accepts new messages.
    async fn cancel(&self, thread_id: &str, run_id: &str) {
        match self.backend.cancel_run(thread_id, run_id).await {
            Ok(()) => tracing::warn!(run_id, thread_id, "cancelled run waiting for tool outputs"),
            Err(e) => tracing::error!(run_id, thread_id, "Failed to cancel run: {e}"),
        }
    }

    async fn extract_reply(&self, thread_id: &str, run_id: &str) -> Result<Option<String>, DialogError> {
        let messages = self.backend.list_messages(thread_id, run_id).await?;
        let text = messages
            .into_iter()
            .filter(|m| m.role == Role::Assistant && m.run_id.as_deref() == Some(run_id))
            .max_by_key(|m| m.created_at)
            .and_then(|m| m.joined_text());

        if text.is_none() {
            tracing::warn!(run_id, thread_id, "No response received from the assistant");
        }
        Ok(text)
    }
}
