//! ChatServer context and connection acceptor
//!
//! `ChatServer` bundles everything sessions share: the client registry
//! behind one mutex, the shutdown coordinator and the configuration. It is
//! passed to every session as an `Arc`; there is no global state.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::client::{Client, ClientHandle};
use crate::config::Config;
use crate::error::{AppError, RegistryError};
use crate::handler::{run_session, write_loop};
use crate::message::ServerMessage;
use crate::registry::{ClientRegistry, LiveClient};
use crate::router;
use crate::shutdown::Shutdown;
use crate::types::{ClientId, Username};

/// Source of accepted connections
pub trait Acceptor: Send {
    type Stream: AsyncRead + AsyncWrite + Send + 'static;

    /// Wait for the next connection
    fn accept(
        &mut self,
    ) -> impl Future<Output = io::Result<(Self::Stream, Option<SocketAddr>)>> + Send;
}

impl Acceptor for TcpListener {
    type Stream = TcpStream;

    fn accept(
        &mut self,
    ) -> impl Future<Output = io::Result<(Self::Stream, Option<SocketAddr>)>> + Send {
        async move {
            let (stream, addr) = TcpListener::accept(self).await?;
            Ok((stream, Some(addr)))
        }
    }
}

/// Bind the listening socket described by `config`
pub fn bind_listener(config: &Config) -> io::Result<TcpListener> {
    let addr = config.listen_addr();
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(config.backlog)
}

/// Shared server context
#[derive(Debug)]
pub struct ChatServer {
    registry: Mutex<ClientRegistry>,
    shutdown: Shutdown,
    config: Config,
}

impl ChatServer {
    /// Create a server context with an empty registry
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(ClientRegistry::with_limit(config.max_clients)),
            shutdown: Shutdown::new(),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Lock the registry
    ///
    /// No registry method panics halfway through an update, so a poisoned
    /// lock still guards a consistent table.
    fn registry(&self) -> MutexGuard<'_, ClientRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim a registry slot for a connection
    pub fn register(&self, handle: ClientHandle) -> Result<ClientId, RegistryError> {
        self.registry().register(handle)
    }

    /// Remove a client and tell everyone it left
    ///
    /// Clients that never finished the handshake leave silently.
    pub fn remove(&self, id: ClientId) -> Option<Client> {
        let removed = self.registry().remove(id);

        match removed {
            Ok(client) => {
                info!(
                    "Client {} ({}) from {} disconnected after {:?}",
                    client.display_name(),
                    id,
                    client
                        .handle
                        .peer()
                        .map_or_else(|| "unknown".to_string(), |addr| addr.to_string()),
                    client.connected_at.elapsed()
                );
                if let Some(name) = &client.username {
                    self.broadcast(&ServerMessage::Disconnected(name.clone()));
                }
                debug!(
                    "Total clients: {}, registry slots: {}",
                    self.client_count(),
                    self.capacity()
                );
                Some(client)
            }
            Err(e) => {
                warn!("Removal of client {} failed: {}", id, e);
                None
            }
        }
    }

    /// Bind a username to a client, failing if another client holds it
    pub fn bind_username(&self, id: ClientId, username: Username) -> Result<(), RegistryError> {
        self.registry().bind_username(id, username)
    }

    /// Find the client bound to `name`
    pub fn lookup_by_username(&self, name: &str) -> Option<ClientId> {
        self.registry().lookup_by_username(name)
    }

    /// Consistent copy of every live slot
    pub fn snapshot_live(&self) -> Vec<LiveClient> {
        self.registry().snapshot_live()
    }

    /// Number of live clients
    pub fn client_count(&self) -> usize {
        self.registry().count()
    }

    /// Number of allocated registry slots
    pub fn capacity(&self) -> usize {
        self.registry().capacity()
    }

    /// Send a message to every registered client
    pub fn broadcast(&self, msg: &ServerMessage) -> usize {
        let recipients = self.snapshot_live();
        let delivered = router::broadcast(&recipients, &msg.to_bytes());
        debug!("Broadcast delivered to {}/{} clients", delivered, recipients.len());
        delivered
    }

    /// Send a message to the client named `username`, if connected
    pub fn send_private(&self, username: &[u8], msg: &ServerMessage) -> bool {
        let recipients = self.snapshot_live();
        router::private(&recipients, username, &msg.to_bytes())
    }

    /// Register a new connection and start its session
    ///
    /// On error the stream is dropped, which closes the connection.
    pub fn accept_connection<S>(
        self: &Arc<Self>,
        stream: S,
        peer: Option<SocketAddr>,
    ) -> Result<ClientId, AppError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        if self.shutdown.is_triggered() {
            return Err(AppError::ShuttingDown);
        }

        let cancel = self.shutdown.child_token();
        let (sender, receiver) = mpsc::channel(self.config.outbound_queue);
        let handle = ClientHandle::new(sender, cancel.clone(), peer);
        let id = self.register(handle.clone())?;

        let (reader, writer) = tokio::io::split(stream);
        self.shutdown.spawn(write_loop(
            writer,
            receiver,
            cancel,
            self.config.write_timeout,
            id,
        ));
        self.shutdown
            .spawn(run_session(Arc::clone(self), id, handle, reader));

        debug!("Client {} registered from {:?}", id, peer);
        Ok(id)
    }

    /// Accept connections until shutdown is requested
    ///
    /// Interrupted accepts are retried; any other accept error stops the
    /// server. The acceptor is dropped on return, releasing its socket.
    pub async fn serve<A: Acceptor>(self: &Arc<Self>, mut acceptor: A) {
        info!("Waiting for connections...");

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.triggered() => break,
                accepted = acceptor.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = self.accept_connection(stream, peer) {
                        warn!("Couldn't register the new client: {}", e);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    self.shutdown.trigger();
                    break;
                }
            }
        }

        drop(acceptor);
        info!("Stopped accepting connections");
    }

    /// Serve until shutdown, then wait for sessions to finish
    ///
    /// Returns false if sessions outlived the shutdown grace period.
    pub async fn run<A: Acceptor>(self: &Arc<Self>, acceptor: A) -> bool {
        self.serve(acceptor).await;
        self.shutdown.drain(self.config.shutdown_grace).await
    }
}
