//! Server configuration
//!
//! Settings are read from `CHAT_*` environment variables; anything unset
//! falls back to the defaults below.

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default listen port
pub const DEFAULT_PORT: u16 = 1234;

/// Default listen backlog
pub const DEFAULT_BACKLOG: u32 = 10;

/// Default outbound queue depth per connection
pub const DEFAULT_OUTBOUND_QUEUE: usize = 32;

/// Default time allowed for sessions to finish on shutdown
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address to bind
    pub bind_addr: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Listen backlog
    pub backlog: u32,
    /// Hard limit on live registry slots (None = unbounded)
    pub max_clients: Option<usize>,
    /// Deadline for each session read (None = wait forever)
    pub read_timeout: Option<Duration>,
    /// Deadline for each outbound write (None = wait forever)
    pub write_timeout: Option<Duration>,
    /// Outbound queue depth per connection
    pub outbound_queue: usize,
    /// How long shutdown waits for sessions to finish
    pub shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            max_clients: None,
            read_timeout: None,
            write_timeout: None,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let outbound_queue = parse_var(&lookup, "CHAT_OUTBOUND_QUEUE")?
            .unwrap_or(defaults.outbound_queue);
        if outbound_queue == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CHAT_OUTBOUND_QUEUE",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            bind_addr: parse_var(&lookup, "CHAT_BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            port: parse_var(&lookup, "CHAT_PORT")?.unwrap_or(defaults.port),
            backlog: parse_var(&lookup, "CHAT_BACKLOG")?.unwrap_or(defaults.backlog),
            max_clients: parse_var::<usize, _>(&lookup, "CHAT_MAX_CLIENTS")?.filter(|&n| n > 0),
            read_timeout: parse_secs(&lookup, "CHAT_READ_TIMEOUT_SECS")?,
            write_timeout: parse_secs(&lookup, "CHAT_WRITE_TIMEOUT_SECS")?,
            outbound_queue,
            shutdown_grace: parse_secs(&lookup, "CHAT_SHUTDOWN_GRACE_SECS")?
                .unwrap_or(defaults.shutdown_grace),
        })
    }

    /// Socket address the listener binds
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

/// Parse an optional variable; empty values count as unset
fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let value = raw.trim();
    if value.is_empty() {
        return Ok(None);
    }

    value
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        })
}

/// Parse a whole-seconds duration; zero disables it
fn parse_secs<F>(lookup: &F, key: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_var::<u64, _>(lookup, key)?
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs))
}
