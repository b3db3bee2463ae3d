//! Message protocol definitions
//!
//! The wire format is raw text chunks: whatever one read yields is one
//! message. Chunks starting with `/` are commands; anything else is a chat
//! line. Server notices are fixed newline-terminated strings.

use bytes::{BufMut, Bytes, BytesMut};

use crate::types::Username;

/// First byte of every command
pub const COMMAND_SENTINEL: u8 = b'/';

/// Client → Server message, borrowed from the read buffer
#[derive(Debug, PartialEq, Eq)]
pub enum ClientMessage<'a> {
    /// `/exit`: leave the chat
    Exit,
    /// `/private <username> <message>`
    Private { to: &'a [u8], body: &'a [u8] },
    /// `/private` without a destination or a body
    MalformedPrivate,
    /// Any other `/word`
    UnknownCommand(&'a [u8]),
    /// Plain chat line, broadcast to everyone
    Chat(&'a [u8]),
}

impl<'a> ClientMessage<'a> {
    /// Classify one chunk read from a client
    pub fn parse(chunk: &'a [u8]) -> Self {
        if chunk.first() != Some(&COMMAND_SENTINEL) {
            return Self::Chat(chunk);
        }

        let (command, rest) = split_token(chunk);
        match command {
            b"/exit" => Self::Exit,
            b"/private" => parse_private(rest),
            other => Self::UnknownCommand(other),
        }
    }
}

/// Split `/private` arguments into destination and body
///
/// The body is everything after the single separator that follows the
/// destination, kept verbatim.
fn parse_private(args: &[u8]) -> ClientMessage<'_> {
    let args = trim_start(args);
    let (to, rest) = split_token(args);
    let body = rest.get(1..).unwrap_or_default();

    if to.is_empty() || body.iter().all(u8::is_ascii_whitespace) {
        return ClientMessage::MalformedPrivate;
    }
    ClientMessage::Private { to, body }
}

/// Split at the first ASCII whitespace byte; the separator stays in `rest`
fn split_token(bytes: &[u8]) -> (&[u8], &[u8]) {
    let end = bytes
        .iter()
        .position(u8::is_ascii_whitespace)
        .unwrap_or(bytes.len());
    bytes.split_at(end)
}

fn trim_start(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

/// Server → Client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Handshake accepted
    Registered,
    /// Handshake rejected: name taken
    UsernameTaken,
    /// Handshake rejected: name fails validation
    InvalidUsername,
    /// Someone joined
    Connected(Username),
    /// Someone left
    Disconnected(Username),
    /// Broadcast chat line, prefixed with its sender
    Chat { from: Username, content: Bytes },
    /// Private message body, delivered as-is
    Private(Bytes),
    /// `/private` was missing its destination or body
    PrivateUsage,
    /// Unrecognized command
    UnknownCommand,
}

impl ServerMessage {
    /// Encode as the bytes written to the connection
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Registered => {
                Bytes::from_static(b"Info: You have successfully registered in the chat.\n")
            }
            Self::UsernameTaken => Bytes::from_static(b"Error: Username is already in use.\n"),
            Self::InvalidUsername => Bytes::from_static(b"Error: Invalid username.\n"),
            Self::Connected(name) => Bytes::from(format!("Client {name} has connected.\n")),
            Self::Disconnected(name) => Bytes::from(format!("Client {name} has disconnected.\n")),
            Self::Chat { from, content } => {
                let mut buf = BytesMut::with_capacity(from.as_bytes().len() + 2 + content.len());
                buf.put_slice(from.as_bytes());
                buf.put_slice(b": ");
                buf.put_slice(content);
                buf.freeze()
            }
            Self::Private(body) => body.clone(),
            Self::PrivateUsage => {
                Bytes::from_static(b"Error: Usage: /private <username> <message>\n")
            }
            Self::UnknownCommand => Bytes::from_static(b"Error: Unknown command.\n"),
        }
    }
}
