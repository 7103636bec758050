//! Error types for the terminal crate.

use thiserror::Error;

/// Terminal error type covering every failure a session can surface.
#[derive(Debug, Error)]
pub enum TerminalError {
    /// The connection was closed, either by the peer, by a transport failure,
    /// or explicitly through [`TerminalSession::close`](crate::TerminalSession::close).
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// An authenticated user was attached to a session that already has one.
    #[error("session already authenticated as {username}")]
    UserAlreadySet {
        /// The user currently attached to the session.
        username: String,
    },
}

impl TerminalError {
    /// Shorthand for a [`TerminalError::ConnectionClosed`] with a static reason.
    pub fn closed(reason: impl Into<String>) -> Self {
        TerminalError::ConnectionClosed(reason.into())
    }

    /// Returns `true` for errors that mean the connection is gone.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TerminalError::ConnectionClosed(_))
    }
}

/// Result type alias for terminal operations.
pub type Result<T> = std::result::Result<T, TerminalError>;

// Every transport I/O failure ends the session; the kind only survives in the message.
impl From<std::io::Error> for TerminalError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::UnexpectedEof => TerminalError::ConnectionClosed("end of stream".to_string()),
            _ => TerminalError::ConnectionClosed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_closed_error_display() {
        let err = TerminalError::ConnectionClosed("peer disconnected".to_string());
        assert_eq!(err.to_string(), "connection closed: peer disconnected");
    }

    #[test]
    fn test_user_already_set_error_display() {
        let err = TerminalError::UserAlreadySet {
            username: "alice".to_string(),
        };
        assert_eq!(err.to_string(), "session already authenticated as alice");
    }

    #[test]
    fn test_from_io_error_reset() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: TerminalError = io_err.into();
        assert!(err.is_disconnect());
        assert_eq!(err.to_string(), "connection closed: reset");
    }

    #[test]
    fn test_from_io_error_eof() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "early eof");
        let err: TerminalError = io_err.into();
        assert_eq!(err.to_string(), "connection closed: end of stream");
    }

    #[test]
    fn test_from_io_error_other_is_still_disconnect() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "weird");
        let err: TerminalError = io_err.into();
        assert!(err.is_disconnect());
    }

    #[test]
    fn test_user_already_set_is_not_disconnect() {
        let err = TerminalError::UserAlreadySet {
            username: "bob".to_string(),
        };
        assert!(!err.is_disconnect());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TerminalError>();
    }
}
