//! Message routing
//!
//! Stateless delivery over a registry snapshot. Delivery is best-effort:
//! a failure for one recipient is logged and skipped, never reported back
//! to the sender.

use bytes::Bytes;
use tracing::debug;

use crate::registry::LiveClient;

/// Deliver `message` to every registered client in the snapshot
///
/// Clients still in the handshake are skipped. Returns how many
/// recipients accepted the message.
pub fn broadcast(recipients: &[LiveClient], message: &Bytes) -> usize {
    recipients
        .iter()
        .filter(|client| client.is_registered())
        .filter(|client| deliver(client, message))
        .count()
}

/// Deliver `message` to the client named `username`, if any
///
/// An unknown name is a silent no-op. Returns whether a recipient
/// accepted the message.
pub fn private(recipients: &[LiveClient], username: &[u8], message: &Bytes) -> bool {
    let Some(client) = recipients.iter().find(|client| {
        client
            .username
            .as_ref()
            .is_some_and(|name| name.as_bytes() == username)
    }) else {
        debug!(
            "Private message for unknown user '{}' dropped",
            String::from_utf8_lossy(username)
        );
        return false;
    };

    deliver(client, message)
}

fn deliver(client: &LiveClient, message: &Bytes) -> bool {
    match client.handle.send(message.clone()) {
        Ok(()) => true,
        Err(e) => {
            debug!("Delivery to client {} failed: {}", client.id, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::client::ClientHandle;
    use crate::types::{ClientId, Username};

    fn live(id: usize, name: Option<&str>, capacity: usize) -> (LiveClient, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        let client = LiveClient {
            id: ClientId(id),
            handle: ClientHandle::new(tx, CancellationToken::new(), None),
            username: name.map(|n| Username::parse(n.as_bytes()).unwrap()),
        };
        (client, rx)
    }

    #[test]
    fn test_broadcast_reaches_registered_only() {
        let (alice, mut alice_rx) = live(0, Some("alice"), 4);
        let (pending, mut pending_rx) = live(1, None, 4);
        let (bob, mut bob_rx) = live(2, Some("bob"), 4);
        let msg = Bytes::from_static(b"hello\n");

        let delivered = broadcast(&[alice, pending, bob], &msg);

        assert_eq!(delivered, 2);
        assert_eq!(alice_rx.try_recv().unwrap(), msg);
        assert_eq!(bob_rx.try_recv().unwrap(), msg);
        assert!(pending_rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_isolates_failures() {
        let (alice, alice_rx) = live(0, Some("alice"), 4);
        let (bob, mut bob_rx) = live(1, Some("bob"), 1);
        let (carol, mut carol_rx) = live(2, Some("carol"), 4);
        drop(alice_rx);
        bob.handle.send(Bytes::from_static(b"backlog")).unwrap();
        let msg = Bytes::from_static(b"hi");

        let delivered = broadcast(&[alice, bob, carol], &msg);

        assert_eq!(delivered, 1);
        assert_eq!(carol_rx.try_recv().unwrap(), msg);
        assert_eq!(bob_rx.try_recv().unwrap(), Bytes::from_static(b"backlog"));
        assert!(bob_rx.try_recv().is_err());
    }

    #[test]
    fn test_private_single_recipient() {
        let (alice, mut alice_rx) = live(0, Some("alice"), 4);
        let (bob, mut bob_rx) = live(1, Some("bob"), 4);
        let msg = Bytes::from_static(b"hello there");

        assert!(private(&[alice, bob], b"bob", &msg));

        assert_eq!(bob_rx.try_recv().unwrap(), msg);
        assert!(alice_rx.try_recv().is_err());
    }

    #[test]
    fn test_private_unknown_user_is_noop() {
        let (alice, mut alice_rx) = live(0, Some("alice"), 4);
        let (pending, mut pending_rx) = live(1, None, 4);

        assert!(!private(&[alice, pending], b"nobody", &Bytes::from_static(b"x")));
        assert!(!private(&[], b"alice", &Bytes::from_static(b"x")));

        assert!(alice_rx.try_recv().is_err());
        assert!(pending_rx.try_recv().is_err());
    }
}
