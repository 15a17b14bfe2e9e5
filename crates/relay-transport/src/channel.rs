//! Chat transport over an in-process channel of server messages.

use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use async_trait::async_trait;
use relay_core::traits::{ChatTransport, MessageRef, TransportError, UserId};
use tokio::sync::mpsc;

use crate::protocol::ServerMessage;

/// Sends replies, edits and deletions as `ServerMessage`s.
///
/// Message ids are assigned per transport, starting at 1.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<ServerMessage>,
    next_id: Arc<AtomicI64>,
}

impl ChannelTransport {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            tx,
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// A transport paired with the receiving end of its channel.
    #[must_use]
    pub fn unbounded() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Send a message that is not tied to a reply, such as `Pong`.
    ///
    /// # Errors
    /// Returns error if the receiving end is gone.
    pub fn send(&self, message: ServerMessage) -> Result<(), TransportError> {
        self.tx.send(message).map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl ChatTransport for ChannelTransport {
    async fn reply(&self, user_id: UserId, text: &str) -> Result<MessageRef, TransportError> {
        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.send(ServerMessage::Reply {
            message_id,
            text: text.to_string(),
        })?;
        Ok(MessageRef {
            chat_id: user_id,
            message_id,
        })
    }

    async fn edit_reply(&self, message: &MessageRef, text: &str) -> Result<(), TransportError> {
        self.send(ServerMessage::Edit {
            message_id: message.message_id,
            text: text.to_string(),
        })
    }

    async fn delete_reply(&self, message: &MessageRef) -> Result<(), TransportError> {
        self.send(ServerMessage::Delete {
            message_id: message.message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[tokio::test]
    async fn test_ids_increase_per_reply() {
        let (transport, mut rx) = ChannelTransport::unbounded();

        let first = assert_ok!(transport.reply(1, "a").await);
        let second = assert_ok!(transport.reply(1, "b").await);
        assert_ok!(transport.edit_reply(&first, "a2").await);

        assert_eq!((first.message_id, second.message_id), (1, 2));
        assert_eq!(rx.recv().await, Some(ServerMessage::Reply { message_id: 1, text: "a".into() }));
        assert_eq!(rx.recv().await, Some(ServerMessage::Reply { message_id: 2, text: "b".into() }));
        assert_eq!(rx.recv().await, Some(ServerMessage::Edit { message_id: 1, text: "a2".into() }));
    }

    #[tokio::test]
    async fn test_closed_channel_is_reported() {
        let (transport, rx) = ChannelTransport::unbounded();
        drop(rx);
        let err = assert_err!(transport.reply(1, "lost").await);
        assert!(matches!(err, TransportError::Closed));
    }
}
