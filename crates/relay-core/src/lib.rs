//! Core abstractions for the assistant relay.
//!
//! This crate provides the fundamental building blocks:
//! - `Message`, `Persona`, `Thread`, `Run`, `StoredFile` - the data model
//! - `chunker::split` - transport-sized splitting of replies
//! - `DialogContext` - explicit addressing of one exchange
//! - Storage, backend, transport and task-list traits
//! - `RelayConfig` - TOML configuration

pub mod chunker;
pub mod config;
pub mod context;
pub mod file;
pub mod message;
pub mod persona;
pub mod stream;
pub mod thread;
pub mod traits;

pub use config::RelayConfig;
pub use context::DialogContext;
pub use file::StoredFile;
pub use message::{Message, Role};
pub use persona::{Persona, PersonaParams};
pub use stream::{Delta, RunStream, StreamEvent};
pub use thread::{Run, RunStatus, Thread, ThreadMessage};
pub use traits::{ChatTransport, CompletionBackend, DocumentStore, TaskListProvider, UserId};
