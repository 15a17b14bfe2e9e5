//! Chat channel bindings for the assistant relay.
//!
//! Provides:
//! - `Relay` - commands, access control and reply delivery
//! - `MessageSink` - live-edited replies while streaming
//! - Wire protocol (tagged JSON)
//! - `ChannelTransport` - chat transport over an in-process channel
//! - WebSocket transport (feature: websocket)

pub mod channel;
pub mod protocol;
pub mod relay;
pub mod sink;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use channel::ChannelTransport;
pub use protocol::{ClientMessage, ServerMessage};
pub use relay::{ChannelEvent, Command, Relay};
pub use sink::MessageSink;
