//! Error types for the chat connection and the game-server queries.

use std::io;

use thiserror::Error;

/// Fatal failure of a chat connection. Reported once per task on the
/// connection's error channel; there is no automatic reconnect.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connect to {addr} failed: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("read failed: {0}")]
    Read(#[source] io::Error),
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
    #[error("connection closed by peer")]
    Eof,
    #[error("connection is closed")]
    Closed,
}

/// A chat line that could not be turned into an [`Event`](crate::event::Event).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("line has a prefix but no command: {0:?}")]
    MissingCommand(String),
    #[error("line exceeds {0} bytes")]
    TooLong(usize),
}

/// A response buffer that does not match the expected wire layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("bad response header")]
    BadHeader,
    #[error("bad response type: expected {expected:#04x}, found {found:#04x}")]
    BadSentinel { expected: u8, found: u8 },
    #[error("short response: {len} bytes, need at least {min}")]
    ShortResponse { len: usize, min: usize },
    #[error("unexpected end of data: field needs {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
}

impl DecodeError {
    /// True when a field ran past the end of the buffer, as opposed to a
    /// structural mismatch such as a wrong header or sentinel.
    pub fn is_truncation(&self) -> bool {
        matches!(self, DecodeError::Truncated { .. })
    }
}

/// Failure of one game-server query call. Never fatal; callers poll again.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown game {0:?}")]
    UnknownGame(String),
    #[error("invalid server address {0:?}")]
    InvalidAddress(String),
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("query timed out")]
    Timeout,
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_is_distinguished_from_structural_errors() {
        assert!(DecodeError::Truncated { needed: 2, remaining: 1 }.is_truncation());
        assert!(!DecodeError::BadHeader.is_truncation());
        assert!(!DecodeError::BadSentinel { expected: 0x44, found: 0x41 }.is_truncation());
    }

    #[test]
    fn decode_error_converts_into_query_error() {
        let err: QueryError = DecodeError::BadHeader.into();
        assert!(matches!(err, QueryError::Decode(DecodeError::BadHeader)));
        assert_eq!(err.to_string(), "bad response header");
    }
}
