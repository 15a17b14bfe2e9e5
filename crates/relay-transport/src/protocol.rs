//! Wire protocol for client-server communication.

use relay_core::traits::UserId;
use serde::{Deserialize, Serialize};

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Text typed by a user; commands start with `/`.
    ///
    /// The connection's token decides the user. A `user_id` naming anyone
    /// else is refused.
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<UserId>,
        text: String,
    },
    /// Ping for keepalive.
    Ping,
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// New message shown to the user.
    Reply { message_id: i64, text: String },
    /// Replacement text of an earlier reply.
    Edit { message_id: i64, text: String },
    /// Removal of an earlier reply.
    Delete { message_id: i64 },
    /// Error message.
    Error { message: String },
    /// Pong response.
    Pong,
}
