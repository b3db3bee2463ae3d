//! Basic type definitions for the chat relay
//!
//! Provides newtype wrappers for type safety:
//! - `ClientId`: registry slot identifier
//! - `Username`: a validated chat name

use std::fmt;

use crate::error::UsernameError;

/// Longest accepted username, in bytes
pub const MAX_USERNAME_LEN: usize = 49;

/// Bytes read from a new connection when waiting for its username
pub const USERNAME_READ_LEN: usize = MAX_USERNAME_LEN + 1;

/// Bytes read per chunk in the message loop
pub const READ_CHUNK_LEN: usize = 1024;

/// Registry slot identifier (newtype pattern)
///
/// Equals the slot's position in the registry for as long as the slot is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub usize);

impl ClientId {
    /// Position of the slot in the registry table
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Chat username
///
/// Always non-empty, valid UTF-8, free of whitespace and control bytes,
/// and at most `MAX_USERNAME_LEN` bytes long.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    /// Parse a username from the raw bytes of the handshake read
    ///
    /// The candidate ends at the first control byte; surrounding spaces are
    /// trimmed. A read that filled the whole handshake buffer without a
    /// control byte is treated as too long rather than silently truncated.
    pub fn parse(raw: &[u8]) -> Result<Self, UsernameError> {
        let end = raw
            .iter()
            .position(|b| b.is_ascii_control())
            .unwrap_or(raw.len());

        if end >= USERNAME_READ_LEN {
            return Err(UsernameError::TooLong {
                len: end,
                max: MAX_USERNAME_LEN,
            });
        }

        let name = std::str::from_utf8(&raw[..end])
            .map_err(|_| UsernameError::InvalidUtf8)?
            .trim_matches(' ');

        if name.is_empty() {
            return Err(UsernameError::Empty);
        }
        if name.len() > MAX_USERNAME_LEN {
            return Err(UsernameError::TooLong {
                len: name.len(),
                max: MAX_USERNAME_LEN,
            });
        }
        if name.chars().any(char::is_whitespace) {
            return Err(UsernameError::ContainsWhitespace);
        }

        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
