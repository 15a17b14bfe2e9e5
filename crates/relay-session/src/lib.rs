//! Per-user conversation state for the assistant relay.
//!
//! Provides:
//! - `SessionStore`, `SettingsStore`, `ThreadIndex` - typed per-user documents
//! - `UserLocks` - per-user serialization
//! - `ConversationManager` - bootstrap, exchanges and persistence
//! - Storage implementations (memory, JSON files)

pub mod locks;
pub mod manager;
pub mod session;
pub mod settings;
pub mod storage;
pub mod threads;

pub use locks::UserLocks;
pub use manager::{ConversationManager, ManagerError};
pub use session::SessionStore;
pub use settings::{SettingsError, SettingsStore};
pub use threads::ThreadIndex;
