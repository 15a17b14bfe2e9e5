//! Addressing of a single exchange.

use serde::{Deserialize, Serialize};

use crate::{persona::PersonaId, thread::ThreadId, traits::UserId};

/// The (user, persona, thread) triple an exchange is sent to.
///
/// Resolved from the user's settings and thread index before every exchange;
/// nothing about the current thread is remembered between calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogContext {
    /// User the exchange belongs to.
    pub user_id: UserId,
    /// The user's active persona.
    pub persona_id: PersonaId,
    /// The user's current thread.
    pub thread_id: ThreadId,
}

impl DialogContext {
    #[must_use]
    pub fn new(
        user_id: UserId,
        persona_id: impl Into<PersonaId>,
        thread_id: impl Into<ThreadId>,
    ) -> Self {
        Self {
            user_id,
            persona_id: persona_id.into(),
            thread_id: thread_id.into(),
        }
    }
}
