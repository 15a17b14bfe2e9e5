//! Streamed run output.

use futures::stream::BoxStream;

use crate::{thread::RunId, traits::BackendError};

/// One incremental fragment of a run's output text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    /// Run the fragment belongs to, when the backend announced it.
    pub run_id: Option<RunId>,
    /// Text to append.
    pub text: String,
}

impl Delta {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            run_id: None,
            text: text.into(),
        }
    }
}

/// Event of a streamed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text.
    Delta(Delta),
    /// The run finished; no more deltas follow.
    Done,
}

impl StreamEvent {
    /// Shorthand for a delta without run id.
    #[must_use]
    pub fn delta(text: impl Into<String>) -> Self {
        Self::Delta(Delta::new(text))
    }
}

/// Stream of run events; an `Err` item ends the stream.
pub type RunStream = BoxStream<'static, Result<StreamEvent, BackendError>>;
