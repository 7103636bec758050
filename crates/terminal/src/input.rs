//! Character decoding on top of the raw client byte stream.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

use crate::error::Result;
use crate::telnet::{TelnetEvent, TelnetFilter};

/// Terminal geometry shared between the reader (which receives size reports)
/// and the session (which uses it to size screen clears).
#[derive(Debug)]
pub struct Geometry {
    rows: AtomicU16,
    columns: AtomicU16,
}

impl Geometry {
    /// Creates geometry with the given initial size.
    pub fn new(rows: u16, columns: u16) -> Self {
        Self {
            rows: AtomicU16::new(rows),
            columns: AtomicU16::new(columns),
        }
    }

    /// Current row count.
    pub fn rows(&self) -> u16 {
        self.rows.load(Ordering::Relaxed)
    }

    /// Current column count.
    pub fn columns(&self) -> u16 {
        self.columns.load(Ordering::Relaxed)
    }

    /// Updates the size.
    pub fn set(&self, rows: u16, columns: u16) {
        self.rows.store(rows, Ordering::Relaxed);
        self.columns.store(columns, Ordering::Relaxed);
    }
}

/// Reads one character at a time from a telnet byte stream.
///
/// Telnet commands are filtered out, input is decoded as UTF-8 (invalid
/// sequences are skipped without consuming the byte that broke them), and
/// line endings are folded so that `CR LF`,
/// `CR NUL` and a lone `LF` all surface as a single `'\r'`.
pub struct CharReader<R> {
    inner: BufReader<R>,
    telnet: TelnetFilter,
    geometry: Arc<Geometry>,
    after_cr: bool,
    pushback: Option<u8>,
}

impl<R: AsyncRead + Unpin> CharReader<R> {
    /// Wraps a byte stream.
    pub fn new(reader: R, geometry: Arc<Geometry>) -> Self {
        Self {
            inner: BufReader::new(reader),
            telnet: TelnetFilter::new(),
            geometry,
            after_cr: false,
            pushback: None,
        }
    }

    /// Reads the next user character.
    ///
    /// Fails with `ConnectionClosed` at end of stream.
    pub async fn read_char(&mut self) -> Result<char> {
        loop {
            let Some(c) = self.decode_char().await? else {
                continue;
            };
            let after_cr = std::mem::replace(&mut self.after_cr, c == '\r');
            match c {
                '\n' | '\0' if after_cr => continue,
                '\n' => return Ok('\r'),
                _ => return Ok(c),
            }
        }
    }

    async fn decode_char(&mut self) -> Result<Option<char>> {
        let first = self.next_byte().await?;
        let width = utf8_width(first);
        match width {
            0 => Ok(None),
            1 => Ok(Some(first as char)),
            _ => {
                let mut buf = [first, 0, 0, 0];
                for slot in buf.iter_mut().take(width).skip(1) {
                    let byte = self.next_byte().await?;
                    if !is_continuation(byte) {
                        // Decode the offending byte on its own next time.
                        self.pushback = Some(byte);
                        return Ok(None);
                    }
                    *slot = byte;
                }
                Ok(std::str::from_utf8(&buf[..width])
                    .ok()
                    .and_then(|s| s.chars().next()))
            }
        }
    }

    async fn next_byte(&mut self) -> Result<u8> {
        if let Some(byte) = self.pushback.take() {
            return Ok(byte);
        }
        loop {
            let byte = self.inner.read_u8().await?;
            match self.telnet.feed(byte) {
                Some(TelnetEvent::Data(b)) => return Ok(b),
                Some(TelnetEvent::WindowSize { columns, rows }) => {
                    tracing::debug!(columns, rows, "Client reported window size");
                    self.geometry.set(rows, columns);
                }
                None => {}
            }
        }
    }
}

/// Encoded length of a UTF-8 sequence from its first byte, or 0 if the byte
/// cannot start one.
fn utf8_width(first: u8) -> usize {
    match first {
        0x00..=0x7f => 1,
        0xc2..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf4 => 4,
        _ => 0,
    }
}

fn is_continuation(byte: u8) -> bool {
    matches!(byte, 0x80..=0xbf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telnet::{IAC, OPT_NAWS, SB, SE, WILL};

    fn reader(bytes: &'static [u8]) -> (CharReader<&'static [u8]>, Arc<Geometry>) {
        let geometry = Arc::new(Geometry::new(24, 80));
        (CharReader::new(bytes, Arc::clone(&geometry)), geometry)
    }

    async fn read_all(reader: &mut CharReader<&'static [u8]>) -> String {
        let mut out = String::new();
        while let Ok(c) = reader.read_char().await {
            out.push(c);
        }
        out
    }

    #[tokio::test]
    async fn test_reads_ascii() {
        let (mut r, _) = reader(b"abc");
        assert_eq!(read_all(&mut r).await, "abc");
    }

    #[tokio::test]
    async fn test_folds_crlf_and_crnul() {
        let (mut r, _) = reader(b"a\r\nb\r\0c\r");
        assert_eq!(read_all(&mut r).await, "a\rb\rc\r");
    }

    #[tokio::test]
    async fn test_lone_lf_is_cr() {
        let (mut r, _) = reader(b"a\nb\n");
        assert_eq!(read_all(&mut r).await, "a\rb\r");
    }

    #[tokio::test]
    async fn test_decodes_utf8() {
        let (mut r, _) = reader("héllo ✓".as_bytes());
        assert_eq!(read_all(&mut r).await, "héllo ✓");
    }

    #[tokio::test]
    async fn test_skips_invalid_utf8_lead() {
        let (mut r, _) = reader(&[b'a', 0x80, b'b']);
        assert_eq!(read_all(&mut r).await, "ab");
    }

    #[tokio::test]
    async fn test_truncated_sequence_keeps_line_end() {
        let (mut r, _) = reader(&[b'a', 0xe9, b'\r', b'b', b'\r']);
        assert_eq!(read_all(&mut r).await, "a\rb\r");
    }

    #[tokio::test]
    async fn test_truncated_sequence_keeps_next_char() {
        // Three-byte lead cut short by ASCII, then a valid two-byte char.
        let (mut r, _) = reader(&[0xe2, 0x9c, b'x', 0xc3, 0xa9, b'\n']);
        assert_eq!(read_all(&mut r).await, "x\u{e9}\r");
    }

    #[tokio::test]
    async fn test_latin1_line_then_crlf() {
        let (mut r, _) = reader(&[b'c', b'a', b'f', 0xe9, b'\r', b'\n', b'n', b'\r']);
        assert_eq!(read_all(&mut r).await, "caf\rn\r");
    }

    #[tokio::test]
    async fn test_strips_telnet_and_updates_geometry() {
        const BYTES: &[u8] = &[
            IAC, WILL, OPT_NAWS, b'x', IAC, SB, OPT_NAWS, 0, 100, 0, 30, IAC, SE, b'y',
        ];
        let (mut r, geometry) = reader(BYTES);
        assert_eq!(read_all(&mut r).await, "xy");
        assert_eq!(geometry.rows(), 30);
        assert_eq!(geometry.columns(), 100);
    }

    #[tokio::test]
    async fn test_end_of_stream_is_connection_closed() {
        let (mut r, _) = reader(b"");
        let err = r.read_char().await.unwrap_err();
        assert!(err.is_disconnect());
    }
}
