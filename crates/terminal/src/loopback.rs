//! In-memory client end for a [`TerminalSession`](crate::TerminalSession).
//!
//! Used by tests and local tooling to drive a session without a socket.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::{timeout, Instant};

/// Buffer size of the in-memory pipe in each direction.
pub const LOOPBACK_BUFFER: usize = 64 * 1024;

/// How long [`LoopbackClient::read_available`] waits for more bytes.
const QUIET_PERIOD: Duration = Duration::from_millis(25);

/// Upper bound for [`LoopbackClient::read_until`] and [`LoopbackClient::read_to_end`].
const READ_DEADLINE: Duration = Duration::from_secs(5);

/// The client side of a loopback session.
#[derive(Debug)]
pub struct LoopbackClient {
    stream: DuplexStream,
}

impl LoopbackClient {
    pub(crate) fn new(stream: DuplexStream) -> Self {
        Self { stream }
    }

    /// Types `text` into the session.
    pub async fn send(&mut self, text: &str) -> std::io::Result<()> {
        self.send_bytes(text.as_bytes()).await
    }

    /// Sends raw bytes (telnet commands, invalid UTF-8, ...).
    pub async fn send_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    /// Reads whatever arrives until the stream stays quiet briefly.
    pub async fn read_available(&mut self) -> String {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        while let Ok(Ok(n)) = timeout(QUIET_PERIOD, self.stream.read(&mut buf)).await {
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Reads until the accumulated output contains `needle`, the stream ends,
    /// or a deadline passes. Returns everything read.
    pub async fn read_until(&mut self, needle: &str) -> String {
        let deadline = Instant::now() + READ_DEADLINE;
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        while !String::from_utf8_lossy(&out).contains(needle) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.stream.read(&mut buf)).await {
                Ok(Ok(n)) if n > 0 => out.extend_from_slice(&buf[..n]),
                _ => break,
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Reads until the session shuts its side down (or a deadline passes).
    pub async fn read_to_end(&mut self) -> String {
        let mut out = Vec::new();
        let _ = timeout(READ_DEADLINE, self.stream.read_to_end(&mut out)).await;
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Drops the connection, as a client hanging up would.
    pub fn disconnect(self) {
        drop(self.stream);
    }
}
