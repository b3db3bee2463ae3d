//! Client struct definition
//!
//! Represents a connected client: its registry slot, its username once the
//! handshake is done, and the handle used to reach its connection.

use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SendError;
use crate::types::{ClientId, Username};

/// Outbound side of a connection
///
/// Messages are queued for the connection's writer task, which is the only
/// code that touches the socket's write half. The token doubles as the
/// session's cancellation signal: cancelling it closes the connection.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    sender: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    peer: Option<SocketAddr>,
}

impl ClientHandle {
    /// Create a handle from an outbound queue and the connection's token
    pub fn new(
        sender: mpsc::Sender<Bytes>,
        cancel: CancellationToken,
        peer: Option<SocketAddr>,
    ) -> Self {
        Self {
            sender,
            cancel,
            peer,
        }
    }

    /// Queue a message for this connection without waiting
    ///
    /// Returns an error if the writer is gone or the queue is full. A send
    /// racing with `close` may still be queued; the writer flushes it before
    /// shutting the socket, and any send after that fails.
    pub fn send(&self, msg: Bytes) -> Result<(), SendError> {
        if self.cancel.is_cancelled() {
            return Err(SendError::ChannelClosed);
        }
        self.sender.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Close the connection
    ///
    /// The writer flushes whatever is already queued, then shuts the socket.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Check if the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token cancelled when this connection closes
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Remote address, when the transport has one
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }
}

/// Connected client information
///
/// One registry slot. The registry owns the record from registration
/// until removal.
#[derive(Debug)]
pub struct Client {
    /// Slot identifier
    pub id: ClientId,
    /// Connection handle, closed exactly once on removal
    pub handle: ClientHandle,
    /// Username (None before the handshake completes)
    pub username: Option<Username>,
    /// Registration time
    pub connected_at: Instant,
}

impl Client {
    /// Create a new client occupying the given slot
    pub fn new(id: ClientId, handle: ClientHandle) -> Self {
        Self {
            id,
            handle,
            username: None,
            connected_at: Instant::now(),
        }
    }

    /// Get the display name for this client
    ///
    /// Returns the username if set, otherwise "Unknown".
    pub fn display_name(&self) -> &str {
        self.username.as_ref().map_or("Unknown", Username::as_str)
    }
}
