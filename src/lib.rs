//! Multi-user TCP Chat Relay Library
//!
//! A small chat server: clients connect over TCP, register a username and
//! exchange broadcast or private messages relayed by the server.
//!
//! # Features
//! - Username handshake with uniqueness check
//! - Broadcast chat lines prefixed with the sender's name
//! - Private messages with `/private <username> <message>`
//! - Join and leave notices
//! - Graceful shutdown that waits for live sessions
//!
//! # Architecture
//! - `ChatServer` is the shared context: registry, shutdown flag, config
//! - The registry is a slot table behind a single mutex
//! - Each connection has a session task and a writer task
//! - Routing works on registry snapshots, never on the live table
//!
//! # Example
//! ```ignore
//! use chat_relay::{bind_listener, ChatServer, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let listener = bind_listener(&config)?;
//!     let server = ChatServer::new(config);
//!
//!     let shutdown = server.shutdown().clone();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.trigger();
//!     });
//!
//!     server.run(listener).await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod types;

// Re-export main types for convenience
pub use client::{Client, ClientHandle};
pub use config::Config;
pub use error::{AppError, ConfigError, RegistryError, SendError, UsernameError};
pub use handler::DisconnectReason;
pub use message::{ClientMessage, ServerMessage};
pub use registry::{ClientRegistry, LiveClient};
pub use server::{bind_listener, Acceptor, ChatServer};
pub use shutdown::Shutdown;
pub use types::{ClientId, Username};
