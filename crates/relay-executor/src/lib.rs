//! Run coordination against completion backends.
//!
//! Provides:
//! - `RunCoordinator` - submit a message, run a persona, poll or stream the reply
//! - `StreamAggregator` - debounced snapshots of streamed output
//! - `DialogError` - the single error channel of an exchange
//! - Daily-schedule prompt builder
//! - OpenAI Assistants backend (feature `openai`)

pub mod aggregator;
pub mod coordinator;
pub mod error;
#[cfg(feature = "openai")]
pub mod openai;
pub mod schedule;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use aggregator::{SnapshotEvent, SnapshotSink, StreamAggregator};
pub use coordinator::{DialogReply, PollPolicy, RunCoordinator, StreamPolicy};
pub use error::DialogError;
#[cfg(feature = "openai")]
pub use openai::OpenAiAssistants;
