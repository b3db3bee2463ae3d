//! Integration tests for chat_relay.
//!
//! Sessions are driven over in-memory duplex pipes; the last tests go
//! through a real loopback listener.

use std::sync::Arc;
use std::time::Duration;

use chat_relay::{ChatServer, Config};
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Instant};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(100);

/// Client end of a connection, buffering whatever has been received
struct TestClient<S> {
    stream: S,
    received: String,
}

impl<S: AsyncRead + AsyncWrite + Unpin> TestClient<S> {
    fn new(stream: S) -> Self {
        Self {
            stream,
            received: String::new(),
        }
    }

    async fn send(&mut self, text: &str) {
        self.stream.write_all(text.as_bytes()).await.unwrap();
    }

    /// Read until `needle` shows up, then drop everything up to it
    async fn expect(&mut self, needle: &str) {
        let deadline = Instant::now() + WAIT;
        while !self.received.contains(needle) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let mut buf = [0u8; 1024];
            let n = timeout(remaining, self.stream.read(&mut buf))
                .await
                .unwrap_or_else(|_| {
                    panic!("timed out waiting for {needle:?}, got {:?}", self.received)
                })
                .unwrap();
            assert!(
                n > 0,
                "connection closed waiting for {needle:?}, got {:?}",
                self.received
            );
            self.received.push_str(&String::from_utf8_lossy(&buf[..n]));
        }

        let end = self.received.find(needle).unwrap() + needle.len();
        self.received.drain(..end);
    }

    /// Collect traffic for a short while and check `needle` is not in it
    async fn expect_none(&mut self, needle: &str) {
        let deadline = Instant::now() + QUIET;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let mut buf = [0u8; 1024];
            match timeout(remaining, self.stream.read(&mut buf)).await {
                Ok(Ok(n)) if n > 0 => {
                    self.received.push_str(&String::from_utf8_lossy(&buf[..n]))
                }
                _ => break,
            }
        }
        assert!(
            !self.received.contains(needle),
            "unexpected {needle:?} in {:?}",
            self.received
        );
    }

    /// Wait for the server to close the connection
    async fn expect_closed(&mut self) {
        let mut buf = [0u8; 1024];
        loop {
            let n = timeout(WAIT, self.stream.read(&mut buf))
                .await
                .expect("timed out waiting for close")
                .unwrap_or(0);
            if n == 0 {
                return;
            }
            self.received.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
    }
}

fn new_server() -> Arc<ChatServer> {
    ChatServer::new(Config::default())
}

fn connect(server: &Arc<ChatServer>) -> TestClient<DuplexStream> {
    let (client, server_side) = duplex(4096);
    server.accept_connection(server_side, None).unwrap();
    TestClient::new(client)
}

async fn join(server: &Arc<ChatServer>, name: &str) -> TestClient<DuplexStream> {
    let mut client = connect(server);
    client.send(&format!("{name}\n")).await;
    client
        .expect("Info: You have successfully registered in the chat.\n")
        .await;
    client.expect(&format!("Client {name} has connected.\n")).await;
    client
}

async fn wait_for_count(server: &ChatServer, expected: usize) {
    let deadline = Instant::now() + WAIT;
    while server.client_count() != expected {
        assert!(
            Instant::now() < deadline,
            "client count stuck at {}, expected {}",
            server.client_count(),
            expected
        );
        sleep(Duration::from_millis(10)).await;
    }
}

mod handshake {
    use super::*;

    #[tokio::test]
    async fn test_join_is_announced() {
        let server = new_server();
        let mut bob = join(&server, "bob").await;

        let _alice = join(&server, "alice").await;

        bob.expect("Client alice has connected.\n").await;
        assert_eq!(server.client_count(), 2);
        assert!(server.lookup_by_username("alice").is_some());
    }

    #[tokio::test]
    async fn test_first_client_count() {
        let server = new_server();
        let _alice = join(&server, "alice").await;

        assert_eq!(server.client_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let server = new_server();
        let mut alice = join(&server, "alice").await;

        let mut impostor = connect(&server);
        impostor.send("alice\n").await;
        impostor.expect("Error: Username is already in use.\n").await;
        impostor.expect_closed().await;

        wait_for_count(&server, 1).await;
        alice.expect_none("has disconnected").await;
        alice.expect_none("has connected").await;
    }

    #[tokio::test]
    async fn test_invalid_username_rejected() {
        let server = new_server();
        let mut client = connect(&server);

        client.send("two words\n").await;
        client.expect("Error: Invalid username.\n").await;
        client.expect_closed().await;

        wait_for_count(&server, 0).await;
    }

    #[tokio::test]
    async fn test_pending_client_gets_no_broadcasts() {
        let server = new_server();
        let mut pending = connect(&server);

        let mut alice = join(&server, "alice").await;
        alice.send("hello\n").await;
        alice.expect("alice: hello\n").await;

        pending.expect_none("alice").await;
        assert_eq!(server.client_count(), 2);
    }

    #[tokio::test]
    async fn test_name_reusable_after_leave() {
        let server = new_server();
        let alice = join(&server, "alice").await;
        drop(alice);
        wait_for_count(&server, 0).await;

        let _again = join(&server, "alice").await;
        assert_eq!(server.client_count(), 1);
    }
}

mod messaging {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_chat_line() {
        let server = new_server();
        let mut alice = join(&server, "alice").await;
        let mut bob = join(&server, "bob").await;
        let mut carol = join(&server, "carol").await;

        alice.send("hi everyone").await;

        bob.expect("alice: hi everyone").await;
        carol.expect("alice: hi everyone").await;
        alice.expect("alice: hi everyone").await;
    }

    #[tokio::test]
    async fn test_private_message() {
        let server = new_server();
        let mut alice = join(&server, "alice").await;
        let mut bob = join(&server, "bob").await;
        let mut carol = join(&server, "carol").await;

        alice.send("/private bob hello there").await;

        bob.expect("hello there").await;
        carol.expect_none("hello there").await;
        alice.expect_none("hello there").await;
    }

    #[tokio::test]
    async fn test_private_to_unknown_user_is_silent() {
        let server = new_server();
        let mut alice = join(&server, "alice").await;
        let mut bob = join(&server, "bob").await;

        alice.send("/private nobody psst").await;

        alice.expect_none("psst").await;
        bob.expect_none("psst").await;
        assert_eq!(server.client_count(), 2);
    }

    #[tokio::test]
    async fn test_malformed_private_keeps_session() {
        let server = new_server();
        let mut alice = join(&server, "alice").await;
        let mut bob = join(&server, "bob").await;

        alice.send("/private bob").await;
        alice
            .expect("Error: Usage: /private <username> <message>\n")
            .await;

        alice.send("still here").await;
        bob.expect("alice: still here").await;
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let server = new_server();
        let mut alice = join(&server, "alice").await;
        let mut bob = join(&server, "bob").await;

        alice.send("/shout hey").await;

        alice.expect("Error: Unknown command.\n").await;
        bob.expect_none("hey").await;
    }
}

mod disconnect {
    use super::*;

    #[tokio::test]
    async fn test_close_is_announced() {
        let server = new_server();
        let alice = join(&server, "alice").await;
        let mut bob = join(&server, "bob").await;
        let mut carol = join(&server, "carol").await;
        assert_eq!(server.client_count(), 3);

        drop(alice);

        bob.expect("Client alice has disconnected.\n").await;
        carol.expect("Client alice has disconnected.\n").await;
        wait_for_count(&server, 2).await;
        assert!(server.lookup_by_username("alice").is_none());
    }

    #[tokio::test]
    async fn test_exit_command() {
        let server = new_server();
        let mut alice = join(&server, "alice").await;
        let mut bob = join(&server, "bob").await;

        alice.send("/exit\n").await;

        alice.expect_closed().await;
        bob.expect("Client alice has disconnected.\n").await;
        wait_for_count(&server, 1).await;
    }

    #[tokio::test]
    async fn test_freed_slot_is_reused() {
        let server = new_server();
        let _alice = join(&server, "alice").await;
        let bob = join(&server, "bob").await;
        let bob_id = server.lookup_by_username("bob").unwrap();

        drop(bob);
        wait_for_count(&server, 1).await;

        let _carol = join(&server, "carol").await;
        assert_eq!(server.lookup_by_username("carol"), Some(bob_id));
    }

    #[tokio::test]
    async fn test_read_timeout_disconnects_idle_client() {
        let config = Config {
            read_timeout: Some(Duration::from_millis(50)),
            ..Config::default()
        };
        let server = ChatServer::new(config);
        let mut idle = connect(&server);
        assert_eq!(server.client_count(), 1);

        idle.expect_closed().await;
        wait_for_count(&server, 0).await;
    }
}

mod shutdown {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_ends_sessions() {
        let server = new_server();
        let mut alice = join(&server, "alice").await;
        let mut bob = join(&server, "bob").await;
        let mut pending = connect(&server);

        assert!(server.shutdown().drain(WAIT).await);

        alice.expect_closed().await;
        bob.expect_closed().await;
        pending.expect_closed().await;
        assert_eq!(server.client_count(), 0);
    }

    #[tokio::test]
    async fn test_serve_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = new_server();
        let running = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.run(listener).await }
        });

        let mut alice = TestClient::new(TcpStream::connect(addr).await.unwrap());
        alice.send("alice").await;
        alice
            .expect("Info: You have successfully registered in the chat.\n")
            .await;

        let mut bob = TestClient::new(TcpStream::connect(addr).await.unwrap());
        bob.send("bob").await;
        bob.expect("Client bob has connected.\n").await;
        alice.expect("Client bob has connected.\n").await;

        bob.send("/private alice over tcp\n").await;
        alice.expect("over tcp\n").await;

        server.shutdown().trigger();
        let drained = timeout(WAIT, running).await.unwrap().unwrap();

        assert!(drained);
        alice.expect_closed().await;
        bob.expect_closed().await;
        assert_eq!(server.client_count(), 0);
    }
}
