//! Live-edited chat messages fed by stream snapshots.

use async_trait::async_trait;
use relay_core::traits::{ChatTransport, MessageRef, TransportError, UserId};
use relay_executor::SnapshotSink;

/// Shows snapshots by editing one chat message at a time.
///
/// The first message is a placeholder sent up front. A sealed unit keeps its
/// message; the next snapshot opens a new one.
pub struct MessageSink<'a, T: ?Sized> {
    transport: &'a T,
    user_id: UserId,
    current: Option<MessageRef>,
    shown: bool,
}

impl<'a, T> MessageSink<'a, T>
where
    T: ChatTransport + ?Sized,
{
    /// Send `placeholder` and target it with the first snapshot.
    ///
    /// # Errors
    /// Returns error if the placeholder cannot be sent.
    pub async fn open(transport: &'a T, user_id: UserId, placeholder: &str) -> Result<Self, TransportError> {
        let current = transport.reply(user_id, placeholder).await?;
        Ok(Self {
            transport,
            user_id,
            current: Some(current),
            shown: false,
        })
    }

    /// Whether any snapshot reached the user.
    #[must_use]
    pub const fn has_output(&self) -> bool {
        self.shown
    }

    /// Replace the open message with `text`, or send it if none is open.
    ///
    /// # Errors
    /// Returns error if the transport fails.
    pub async fn show(&mut self, text: &str) -> Result<(), TransportError> {
        match &self.current {
            Some(message) => self.transport.edit_reply(message, text).await,
            None => {
                self.current = Some(self.transport.reply(self.user_id, text).await?);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<T> SnapshotSink for MessageSink<'_, T>
where
    T: ChatTransport + ?Sized,
{
    async fn snapshot(&mut self, text: &str) -> Result<(), TransportError> {
        self.show(text).await?;
        self.shown = true;
        Ok(())
    }

    async fn seal(&mut self, text: &str) -> Result<(), TransportError> {
        self.show(text).await?;
        self.shown = true;
        self.current = None;
        Ok(())
    }
}
