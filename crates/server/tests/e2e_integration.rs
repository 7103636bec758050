//! End-to-end integration tests for whirlnet.
//!
//! These tests run a real server on an ephemeral port and drive it with
//! plain TCP clients:
//! - Login and signup over the wire
//! - Direct messages, broadcast and the user list between two clients
//! - Exit, failed logins and server shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use server::accounts::{CredentialStore, JsonCredentialStore};
use server::config::Config;
use server::terminal::telnet::{IAC, OPT_ECHO, WILL};
use server::WhirlServer;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

const DEADLINE: Duration = Duration::from_secs(5);

struct TestServer {
    server: Arc<WhirlServer>,
    addr: SocketAddr,
    serving: JoinHandle<anyhow::Result<()>>,
    _temp_dir: TempDir,
}

/// Start a server with `alice` and `bob` registered (password `pw`).
async fn start_server(configure: impl FnOnce(&mut Config)) -> TestServer {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.server.bind = "127.0.0.1:0".to_string();
    config.server.motd = "test motd".to_string();
    config.accounts.path = temp_dir.path().join("users.json");
    configure(&mut config);

    let store = JsonCredentialStore::new(&config.accounts.path);
    store.register("alice", "pw").unwrap();
    store.register("bob", "pw").unwrap();

    let server = Arc::new(WhirlServer::new(config, Arc::new(store)));
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve(listener).await })
    };

    TestServer {
        server,
        addr,
        serving,
        _temp_dir: temp_dir,
    }
}

impl TestServer {
    async fn wait_for_shells(&self, expected: usize) {
        let deadline = Instant::now() + DEADLINE;
        while self.server.directory().count().await != expected {
            assert!(Instant::now() < deadline, "expected {expected} shells");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn stop(self) {
        self.server.shutdown().await;
        timeout(DEADLINE, self.serving)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

struct TestClient {
    stream: TcpStream,
    seen: Vec<u8>,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            seen: Vec::new(),
        }
    }

    /// Connect and log in, stopping at the first shell prompt.
    async fn login(addr: SocketAddr, username: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.expect("signup").await;
        client.send(&format!("l{username}\rpw\r")).await;
        client.expect("wsh> ").await;
        client
    }

    async fn send(&mut self, text: &str) {
        self.stream.write_all(text.as_bytes()).await.unwrap();
    }

    /// Read until `needle` shows up, returning everything read since the last call.
    async fn expect(&mut self, needle: &str) -> String {
        let deadline = Instant::now() + DEADLINE;
        let mut buf = [0u8; 4096];
        loop {
            if let Some(text) = self.take_through(needle) {
                return text;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.stream.read(&mut buf)).await {
                Ok(Ok(n)) if n > 0 => self.seen.extend_from_slice(&buf[..n]),
                other => panic!(
                    "never saw {needle:?} ({other:?}); got {:?}",
                    String::from_utf8_lossy(&self.seen)
                ),
            }
        }
    }

    fn take_through(&mut self, needle: &str) -> Option<String> {
        let text = String::from_utf8_lossy(&self.seen).into_owned();
        let end = text.find(needle)? + needle.len();
        let taken = text[..end].to_string();
        self.seen = text[end..].as_bytes().to_vec();
        Some(taken)
    }

    /// Read until the server closes the connection.
    async fn read_to_end(&mut self) -> String {
        let mut rest = Vec::new();
        timeout(DEADLINE, self.stream.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
        self.seen.extend_from_slice(&rest);
        String::from_utf8_lossy(&std::mem::take(&mut self.seen)).into_owned()
    }
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_greeting_negotiates_and_shows_menu() {
    let server = start_server(|_| {}).await;
    let mut client = TestClient::connect(server.addr).await;

    let mut first = [0u8; 3];
    timeout(DEADLINE, client.stream.read_exact(&mut first))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, [IAC, WILL, OPT_ECHO]);

    let screen = client.expect("signup").await;
    assert!(screen.contains("whirlnet"));
    assert!(screen.contains("test motd"));
    assert!(screen.contains("login"));

    server.stop().await;
}

#[tokio::test]
async fn test_login_reaches_shell() {
    let server = start_server(|config| config.server.telnet_negotiation = false).await;

    let mut client = TestClient::connect(server.addr).await;
    client.expect("signup").await;
    client.send("lalice\rpw\r").await;
    let screen = client.expect("wsh> ").await;
    assert!(screen.contains("welcome to whirlshell! type `help' for available commands."));
    assert!(screen.contains("use \"quotes\" for arguments with spaces."));

    server.wait_for_shells(1).await;
    assert!(server.server.directory().get_by_username("alice").await.is_some());

    server.stop().await;
}

#[tokio::test]
async fn test_signup_over_the_wire() {
    let server = start_server(|_| {}).await;

    let mut client = TestClient::connect(server.addr).await;
    client.expect("signup").await;
    client.send("scarol\rsecret\rsecret\r").await;
    client.expect("User created! Please log in.").await;
    client.send("carol\rsecret\r").await;
    client.expect("wsh> ").await;

    server.wait_for_shells(1).await;
    let shell = server.server.directory().get_by_username("carol").await;
    assert!(shell.is_some());

    server.stop().await;
}

#[tokio::test]
async fn test_failed_logins_close_connection() {
    let server = start_server(|config| config.accounts.max_attempts = 2).await;

    let mut client = TestClient::connect(server.addr).await;
    client.expect("signup").await;
    client.send("lalice\rnope\ralice\rstill nope\r").await;

    let rest = client.read_to_end().await;
    assert!(rest.contains("That user wasn't found, or the password was invalid."));
    assert!(rest.contains("Too many attempts."));
    assert_eq!(server.server.directory().count().await, 0);

    server.stop().await;
}

// =============================================================================
// Commands between two clients
// =============================================================================

#[tokio::test]
async fn test_direct_message_between_clients() {
    let server = start_server(|_| {}).await;
    let mut alice = TestClient::login(server.addr, "alice").await;
    let mut bob = TestClient::login(server.addr, "bob").await;
    server.wait_for_shells(2).await;

    alice.send("send bob \"hi there\"\r").await;
    alice.expect("Message sent to bob").await;

    bob.send("echo ok\r").await;
    let out = bob.expect("wsh> ").await;
    assert!(out.contains("Message received: Message from alice: hi there"));

    alice.send("send ghost hello\r").await;
    alice.expect("User ghost not found").await;

    server.stop().await;
}

#[tokio::test]
async fn test_broadcast_and_user_list() {
    let server = start_server(|_| {}).await;
    let mut alice = TestClient::login(server.addr, "alice").await;
    let mut bob = TestClient::login(server.addr, "bob").await;
    server.wait_for_shells(2).await;

    alice.send("users\r").await;
    let listing = alice.expect("wsh> ").await;
    let alice_at = listing.find("- alice").unwrap();
    let bob_at = listing.find("- bob").unwrap();
    assert!(alice_at < bob_at);

    alice.send("broadcast \"lunch time\"\r").await;
    let out = alice.expect("wsh> ").await;
    assert!(out.contains("Message broadcasted to all users"));
    assert!(out.contains("Message received: Broadcast from alice: lunch time"));

    bob.send("\r").await;
    bob.expect("Message received: Broadcast from alice: lunch time")
        .await;

    server.stop().await;
}

#[tokio::test]
async fn test_help_and_unknown_command() {
    let server = start_server(|_| {}).await;
    let mut alice = TestClient::login(server.addr, "alice").await;

    alice.send("help\r").await;
    let help = alice.expect("wsh> ").await;
    assert!(help.contains("Available Commands"));
    for name in ["echo", "exit", "help", "send", "broadcast", "users"] {
        assert!(help.contains(&format!("  {name}: ")), "help misses {name}");
    }

    alice.send("dance\r").await;
    alice.expect("Unknown command: dance").await;

    alice.send("echo \"open\r").await;
    alice.expect("Error parsing command:").await;

    server.stop().await;
}

// =============================================================================
// Disconnects and shutdown
// =============================================================================

#[tokio::test]
async fn test_exit_removes_shell() {
    let server = start_server(|_| {}).await;
    let mut alice = TestClient::login(server.addr, "alice").await;
    server.wait_for_shells(1).await;

    alice.send("exit\r").await;
    let rest = alice.read_to_end().await;
    assert!(rest.contains("Goodbye!"));

    server.wait_for_shells(0).await;
    assert!(server.server.directory().get_by_username("alice").await.is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_dropped_client_is_removed() {
    let server = start_server(|_| {}).await;
    let alice = TestClient::login(server.addr, "alice").await;
    let _bob = TestClient::login(server.addr, "bob").await;
    server.wait_for_shells(2).await;

    drop(alice);
    server.wait_for_shells(1).await;
    let names = server.server.directory().usernames().await;
    assert_eq!(names, vec!["bob"]);

    server.stop().await;
}

#[tokio::test]
async fn test_second_login_takes_over_username() {
    let server = start_server(|_| {}).await;
    let first = TestClient::login(server.addr, "alice").await;
    server.wait_for_shells(1).await;
    let first_id = server
        .server
        .directory()
        .get_by_username("alice")
        .await
        .unwrap()
        .id();

    let _second = TestClient::login(server.addr, "alice").await;
    server.wait_for_shells(2).await;
    let second_id = server
        .server
        .directory()
        .get_by_username("alice")
        .await
        .unwrap()
        .id();
    assert_ne!(first_id, second_id);

    drop(first);
    server.wait_for_shells(1).await;
    let current = server.server.directory().get_by_username("alice").await;
    assert_eq!(current.map(|shell| shell.id()), Some(second_id));

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_notifies_clients() {
    let server = start_server(|_| {}).await;
    let mut alice = TestClient::login(server.addr, "alice").await;
    server.wait_for_shells(1).await;

    let directory = Arc::clone(server.server.directory());
    server.stop().await;

    let rest = alice.read_to_end().await;
    assert!(rest.contains("Server shutting down."));
    assert_eq!(directory.count().await, 0);
}
