//! Outbound side of the duplex channel
//!
//! The engine never owns a socket. It hands fully serialized messages to a
//! [`Transport`], and whoever owns the connection feeds inbound text to
//! [`Peer::handle_text`](crate::Peer::handle_text).

use crate::error::{Error, Result};
use tokio::sync::mpsc;

/// Capability to send one text message to the remote peer
pub trait Transport: Send + Sync + 'static {
    fn send_text(&self, message: String) -> Result<()>;
}

/// Queue-backed transport, drained by a writer task or by another in-process peer
impl Transport for mpsc::UnboundedSender<String> {
    fn send_text(&self, message: String) -> Result<()> {
        self.send(message).map_err(|_| Error::ConnectionClosed)
    }
}
