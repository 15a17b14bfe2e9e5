//! OpenAI Assistants backend.

pub mod client;
pub mod protocol;
pub mod types;

pub use client::{DEFAULT_BASE_URL, OpenAiAssistants};
pub use protocol::{SseDecoder, SseEvent, event_stream};
