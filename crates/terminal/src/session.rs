//! Terminal session: prompts and ordered output over one client connection.
//!
//! A [`TerminalSession`] owns both halves of a connection. Input is read one
//! character at a time and interpreted by the prompt primitives; output is
//! written synchronously into an ordered buffer that a writer task delivers.
//! Sessions are shared (`Arc`) between the shell loop that reads from them
//! and other sessions that push messages into them.

use std::fmt;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TerminalError};
use crate::input::{CharReader, Geometry};
use crate::loopback::{LoopbackClient, LOOPBACK_BUFFER};
use crate::option::KeyedOption;
use crate::output::Output;
use crate::style;
use crate::telnet;
use crate::user::User;

/// Rows assumed until the client reports its window size.
pub const DEFAULT_ROWS: u16 = 24;

/// Columns assumed until the client reports its window size.
pub const DEFAULT_COLUMNS: u16 = 80;

/// Line terminator written to clients.
pub const NEWLINE: &str = "\r\n";

const BACKSPACE: char = '\x08';
const DELETE: char = '\x7f';

/// Width blanked when a menu selection clears its prompt line.
const CLEAR_WIDTH: usize = 25;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Options for a new session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Initial row count.
    pub rows: u16,
    /// Initial column count.
    pub columns: u16,
    /// Peer label used in logs.
    pub peer: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            columns: DEFAULT_COLUMNS,
            peer: None,
        }
    }
}

/// One client's terminal.
pub struct TerminalSession {
    input: Mutex<CharReader<BoxedReader>>,
    output: Output,
    closed: CancellationToken,
    geometry: Arc<Geometry>,
    user: OnceLock<User>,
    peer: Option<String>,
}

impl TerminalSession {
    /// Creates a session over a reader/writer pair.
    ///
    /// Spawns the writer task, so this must run inside a tokio runtime.
    pub fn new<R, W>(reader: R, writer: W, options: SessionOptions) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let geometry = Arc::new(Geometry::new(options.rows, options.columns));
        let closed = CancellationToken::new();
        let reader: BoxedReader = Box::new(reader);

        Self {
            input: Mutex::new(CharReader::new(reader, Arc::clone(&geometry))),
            output: Output::spawn(writer, closed.clone()),
            closed,
            geometry,
            user: OnceLock::new(),
            peer: options.peer,
        }
    }

    /// Creates a session over an accepted TCP connection.
    pub fn from_tcp(stream: TcpStream, mut options: SessionOptions) -> Self {
        if options.peer.is_none() {
            options.peer = stream.peer_addr().ok().map(|addr| addr.to_string());
        }
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer, options)
    }

    /// Creates a session backed by an in-memory pipe, returning the client end.
    pub fn loopback(options: SessionOptions) -> (Self, LoopbackClient) {
        let (server, client) = tokio::io::duplex(LOOPBACK_BUFFER);
        let (reader, writer) = tokio::io::split(server);
        (Self::new(reader, writer, options), LoopbackClient::new(client))
    }

    /// Sends the server's telnet option offers.
    pub fn negotiate(&self) -> Result<()> {
        self.write_bytes(Bytes::copy_from_slice(&telnet::server_greeting()))
    }

    /// The authenticated user, once login has completed.
    pub fn user(&self) -> Option<&User> {
        self.user.get()
    }

    /// Attaches the authenticated user. A session is authenticated at most once.
    pub fn set_user(&self, user: User) -> Result<()> {
        self.user.set(user).map_err(|_| TerminalError::UserAlreadySet {
            username: self
                .user
                .get()
                .map(|u| u.username.clone())
                .unwrap_or_default(),
        })
    }

    /// Peer label for logs.
    pub fn peer(&self) -> &str {
        self.peer.as_deref().unwrap_or("unknown")
    }

    /// Current terminal height.
    pub fn rows(&self) -> u16 {
        self.geometry.rows()
    }

    /// Current terminal width.
    pub fn columns(&self) -> u16 {
        self.geometry.columns()
    }

    /// Whether the session has been closed or its connection lost.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the session is closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    fn write_bytes(&self, bytes: Bytes) -> Result<()> {
        self.output.send(bytes)
    }

    /// Writes text.
    pub fn write(&self, text: &str) -> Result<()> {
        self.write_bytes(Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Writes a line break.
    pub fn newline(&self) -> Result<()> {
        self.write(NEWLINE)
    }

    /// Writes a heading.
    pub fn write_title(&self, text: &str) -> Result<()> {
        self.write(&style::title(text))
    }

    /// Scrolls everything off screen.
    pub fn clear_screen(&self) -> Result<()> {
        self.write(&NEWLINE.repeat(usize::from(self.rows())))
    }

    /// Waits until all output written so far has been delivered.
    pub async fn await_drain(&self) -> Result<()> {
        self.output.drain().await
    }

    /// Closes the session. Output already written is still delivered;
    /// reads and writes issued afterwards fail with `ConnectionClosed`.
    pub fn close(&self) {
        if self.output.close().is_some() {
            tracing::debug!(peer = %self.peer(), "Terminal session closed");
        }
    }

    /// Closes the session and waits for the writer to finish.
    pub async fn shutdown(&self) {
        if let Some(ack) = self.output.close() {
            let _ = ack.await;
            tracing::debug!(peer = %self.peer(), "Terminal session shut down");
        }
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    async fn next_char(&self, input: &mut CharReader<BoxedReader>) -> Result<char> {
        let result = tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(TerminalError::closed("session closed")),
            c = input.read_char() => c,
        };
        if let Err(ref e) = result {
            tracing::debug!(peer = %self.peer(), error = %e, "Terminal read failed");
            self.close();
        }
        result
    }

    /// Reads a single character.
    pub async fn read_char(&self) -> Result<char> {
        let mut input = self.input.lock().await;
        self.next_char(&mut input).await
    }

    /// Prompts for a line of input.
    ///
    /// Writes the prompt on a fresh line and edits a buffer until carriage
    /// return. Backspace removes the last character and, when echoing,
    /// redraws the line. Control characters other than tab are dropped, and
    /// input beyond `max_len` characters is ignored. With `echo` off nothing
    /// typed is shown.
    pub async fn prompt_line(
        &self,
        prompt: &str,
        echo: bool,
        max_len: Option<usize>,
    ) -> Result<String> {
        let mut input = self.input.lock().await;
        self.write(&format!("{NEWLINE}{prompt} "))?;

        let mut buffer = String::new();
        loop {
            match self.next_char(&mut input).await? {
                '\r' => break,
                BACKSPACE | DELETE => {
                    buffer.pop();
                    if echo {
                        // Trailing space overwrites the removed glyph.
                        self.write(&format!("\r{prompt} {buffer} "))?;
                        self.write(&format!("\r{prompt} {buffer}"))?;
                    }
                }
                c if c.is_control() && c != '\t' => {}
                c => {
                    if max_len.is_some_and(|max| buffer.chars().count() >= max) {
                        continue;
                    }
                    buffer.push(c);
                    if echo {
                        let mut utf8 = [0u8; 4];
                        self.write(c.encode_utf8(&mut utf8))?;
                    }
                }
            }
        }
        Ok(buffer)
    }

    /// Prompts for an echoed line of unbounded length.
    pub async fn prompt_text(&self, prompt: &str) -> Result<String> {
        self.prompt_line(prompt, true, None).await
    }

    /// Prompts for a secret (unechoed) line.
    pub async fn prompt_secret(&self, prompt: &str, max_len: usize) -> Result<String> {
        self.prompt_line(prompt, false, Some(max_len)).await
    }

    /// Shows a keyed menu and waits for a single keypress.
    ///
    /// Keys are matched case-sensitively, first match wins. Hidden options
    /// match but are not listed. When nothing matches and `force` is false,
    /// returns `None`; otherwise asks again.
    pub async fn prompt_choice(
        &self,
        options: &[KeyedOption],
        force: bool,
    ) -> Result<Option<KeyedOption>> {
        let mut input = self.input.lock().await;
        for option in options.iter().filter(|o| !o.hidden) {
            self.write(&format!("{NEWLINE}{option}"))?;
        }
        self.newline()?;

        loop {
            let key = self.next_char(&mut input).await?;
            if let Some(matched) = options.iter().find(|o| o.key == key) {
                self.write(&format!("\r{}\r", " ".repeat(CLEAR_WIDTH)))?;
                if let Some(desc) = &matched.desc {
                    self.write(&format!("({desc})"))?;
                }
                return Ok(Some(matched.clone()));
            }

            if !force {
                self.write("(no option selected)")?;
                return Ok(None);
            }
            self.write("\r(you must pick an option)")?;
        }
    }
}

impl fmt::Debug for TerminalSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalSession")
            .field("peer", &self.peer)
            .field("user", &self.user.get().map(|u| u.username.as_str()))
            .field("rows", &self.rows())
            .field("columns", &self.columns())
            .field("closed", &self.is_closed())
            .finish()
    }
}
