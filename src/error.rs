//! Error types for the chat relay
//!
//! Defines application-level errors plus the narrower errors of the
//! registry, outbound delivery, username validation and configuration.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::ClientId;

/// Application-level errors
///
/// Covers fatal startup errors and rejected connections.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal at startup)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The connection could not be registered
    #[error("Registration failed: {0}")]
    Registry(#[from] RegistryError),

    /// The server is shutting down and accepts no new sessions
    #[error("Server is shutting down")]
    ShuttingDown,
}

/// Client registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The configured client limit has been reached
    #[error("Registry is full ({limit} clients)")]
    Full { limit: usize },

    /// The slot table could not grow
    #[error("Could not allocate registry slots")]
    AllocFailure,

    /// Another live client already uses this username
    #[error("Username is already in use")]
    UsernameTaken,

    /// No live client occupies this slot
    #[error("Unknown client {0}")]
    UnknownClient(ClientId),
}

/// Outbound delivery errors
///
/// Occurs when a message cannot be queued for a connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The connection's writer has stopped
    #[error("Channel closed")]
    ChannelClosed,

    /// The connection's outbound queue is full
    #[error("Outbound queue full")]
    QueueFull,
}

/// Username validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsernameError {
    #[error("Username is empty")]
    Empty,

    #[error("Username is {len} bytes long, at most {max} allowed")]
    TooLong { len: usize, max: usize },

    #[error("Username is not valid UTF-8")]
    InvalidUtf8,

    #[error("Username contains whitespace")]
    ContainsWhitespace,
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed
    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}
