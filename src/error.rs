//! Error types shared by the server and the client driver.
//!
//! A checksum mismatch is not an error: it is reported as
//! [`Verdict::Fail`](crate::protocol::Verdict::Fail). Everything here aborts
//! the session (server) or the whole run (client).

use crate::config::ConfigError;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// Failure while speaking the wire protocol on one connection.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Underlying socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Peer closed the connection before sending anything.
    #[error("connection closed by peer")]
    Closed,

    /// Peer closed the connection in the middle of a line or payload.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// A line grew past the limit without a terminating newline.
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    /// The size line was not a non-negative decimal integer.
    #[error("invalid size line: {0:?}")]
    InvalidSize(String),
}

impl ProtocolError {
    /// Map short reads onto [`ProtocolError::UnexpectedEof`].
    pub(crate) fn from_read(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ProtocolError::UnexpectedEof
        } else {
            ProtocolError::Io(e)
        }
    }
}

/// Fatal failure of a client run.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The settings handed to the driver are unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cycle did not complete within {0:?}")]
    Timeout(Duration),

    /// A worker task panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Worker(String),
}
