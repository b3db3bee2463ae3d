//! Connection handler
//!
//! Drives one client session: username handshake, then the message loop,
//! then removal from the registry. Outbound traffic goes through a separate
//! writer task per connection, so only one task ever writes to a socket.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ClientHandle;
use crate::error::RegistryError;
use crate::message::{ClientMessage, ServerMessage};
use crate::server::ChatServer;
use crate::types::{ClientId, Username, READ_CHUNK_LEN, USERNAME_READ_LEN};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Client sent `/exit`
    Exit,
    /// Client closed the connection, or its writer stopped
    Closed,
    /// Reading from the client failed
    ReadError,
    /// No data arrived within the read timeout
    TimedOut,
    /// The server is shutting down
    Shutdown,
    /// Handshake rejected: name already in use
    UsernameTaken,
    /// Handshake rejected: name failed validation
    InvalidUsername,
}

/// Session state machine
#[derive(Debug)]
enum SessionState {
    AwaitingUsername,
    ValidatingUniqueness(Username),
    Registered(Username),
    MessageLoop(Username),
    Terminated(DisconnectReason),
}

/// Result of one read from the client
enum ReadOutcome {
    Data(usize),
    Ended(DisconnectReason),
}

struct Session<R> {
    server: Arc<ChatServer>,
    id: ClientId,
    handle: ClientHandle,
    reader: R,
    buf: Vec<u8>,
}

/// Run a registered connection's session to completion
///
/// Always ends with exactly one removal of `id` from the registry.
pub async fn run_session<R>(
    server: Arc<ChatServer>,
    id: ClientId,
    handle: ClientHandle,
    reader: R,
) -> DisconnectReason
where
    R: AsyncRead + Unpin,
{
    let mut session = Session {
        server,
        id,
        handle,
        reader,
        buf: vec![0; READ_CHUNK_LEN],
    };

    let mut state = SessionState::AwaitingUsername;
    let reason = loop {
        state = match state {
            SessionState::AwaitingUsername => session.await_username().await,
            SessionState::ValidatingUniqueness(name) => session.validate(name),
            SessionState::Registered(name) => session.announce(name),
            SessionState::MessageLoop(name) => session.message_loop(&name).await,
            SessionState::Terminated(reason) => break reason,
        };
    };

    debug!("Session for client {} ended: {:?}", id, reason);
    session.server.remove(id);
    reason
}

impl<R> Session<R>
where
    R: AsyncRead + Unpin,
{
    async fn await_username(&mut self) -> SessionState {
        let n = match self.read_chunk(USERNAME_READ_LEN).await {
            ReadOutcome::Data(n) => n,
            ReadOutcome::Ended(reason) => return SessionState::Terminated(reason),
        };

        match Username::parse(&self.buf[..n]) {
            Ok(name) => SessionState::ValidatingUniqueness(name),
            Err(e) => {
                warn!("Client {} sent an invalid username: {}", self.id, e);
                self.reply(ServerMessage::InvalidUsername);
                SessionState::Terminated(DisconnectReason::InvalidUsername)
            }
        }
    }

    fn validate(&self, name: Username) -> SessionState {
        match self.server.bind_username(self.id, name.clone()) {
            Ok(()) => SessionState::Registered(name),
            Err(RegistryError::UsernameTaken) => {
                info!("Client {} rejected: username '{}' in use", self.id, name);
                self.reply(ServerMessage::UsernameTaken);
                SessionState::Terminated(DisconnectReason::UsernameTaken)
            }
            Err(e) => {
                warn!("Client {} could not bind username: {}", self.id, e);
                SessionState::Terminated(DisconnectReason::Closed)
            }
        }
    }

    fn announce(&self, name: Username) -> SessionState {
        self.reply(ServerMessage::Registered);
        self.server.broadcast(&ServerMessage::Connected(name.clone()));
        info!("Handling connection with client {} ({})", name, self.id);
        SessionState::MessageLoop(name)
    }

    async fn message_loop(&mut self, name: &Username) -> SessionState {
        loop {
            let n = match self.read_chunk(READ_CHUNK_LEN).await {
                ReadOutcome::Data(n) => n,
                ReadOutcome::Ended(reason) => return SessionState::Terminated(reason),
            };

            match ClientMessage::parse(&self.buf[..n]) {
                ClientMessage::Exit => return SessionState::Terminated(DisconnectReason::Exit),
                ClientMessage::Private { to, body } => {
                    let msg = ServerMessage::Private(Bytes::copy_from_slice(body));
                    self.server.send_private(to, &msg);
                }
                ClientMessage::MalformedPrivate => self.reply(ServerMessage::PrivateUsage),
                ClientMessage::UnknownCommand(command) => {
                    debug!(
                        "Client {} sent unknown command '{}'",
                        name,
                        String::from_utf8_lossy(command)
                    );
                    self.reply(ServerMessage::UnknownCommand);
                }
                ClientMessage::Chat(content) => {
                    let msg = ServerMessage::Chat {
                        from: name.clone(),
                        content: Bytes::copy_from_slice(content),
                    };
                    self.server.broadcast(&msg);
                }
            }
        }
    }

    /// Read one chunk of at most `limit` bytes into the buffer
    async fn read_chunk(&mut self, limit: usize) -> ReadOutcome {
        let cancel = self.handle.cancel_token().clone();
        let read_timeout = self.server.config().read_timeout;
        let read = self.reader.read(&mut self.buf[..limit]);

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                let reason = if self.server.shutdown().is_triggered() {
                    DisconnectReason::Shutdown
                } else {
                    DisconnectReason::Closed
                };
                return ReadOutcome::Ended(reason);
            }
            result = with_timeout(read_timeout, read) => result,
        };

        match result {
            None => ReadOutcome::Ended(DisconnectReason::TimedOut),
            Some(Ok(0)) => ReadOutcome::Ended(DisconnectReason::Closed),
            Some(Ok(n)) => ReadOutcome::Data(n),
            Some(Err(e)) => {
                debug!("Read from client {} failed: {}", self.id, e);
                ReadOutcome::Ended(DisconnectReason::ReadError)
            }
        }
    }

    /// Send a notice to this session's own client
    fn reply(&self, msg: ServerMessage) {
        if let Err(e) = self.handle.send(msg.to_bytes()) {
            debug!("Reply to client {} dropped: {}", self.id, e);
        }
    }
}

/// Drain a connection's outbound queue into its socket
///
/// Stops when the connection's token is cancelled, after flushing what was
/// already queued. A failed or timed-out write cancels the token so the
/// session ends too.
pub async fn write_loop<W>(
    mut writer: W,
    mut receiver: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
    write_timeout: Option<Duration>,
    id: ClientId,
) where
    W: AsyncWrite + Unpin,
{
    let mut healthy = true;

    loop {
        let msg = tokio::select! {
            biased;
            msg = receiver.recv() => msg,
            _ = cancel.cancelled() => break,
        };
        let Some(msg) = msg else {
            break;
        };

        if let Err(e) = write_message(&mut writer, &msg, write_timeout).await {
            debug!("Write to client {} failed: {}", id, e);
            healthy = false;
            cancel.cancel();
            break;
        }
    }

    receiver.close();
    if healthy {
        while let Some(msg) = receiver.recv().await {
            if write_message(&mut writer, &msg, write_timeout).await.is_err() {
                break;
            }
        }
    }

    let _ = writer.shutdown().await;
    debug!("Write task ended for client {}", id);
}

async fn write_message<W>(writer: &mut W, msg: &[u8], limit: Option<Duration>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    with_timeout(limit, writer.write_all(msg))
        .await
        .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")))
}

/// Await `fut`, giving up after `limit` if one is set
async fn with_timeout<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}
