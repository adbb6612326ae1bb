//! Error taxonomy shared by the client and server sessions.
//!
//! Errors fall in two groups: connection-fatal ones ([`Error::Protocol`],
//! [`Error::Transport`], [`Error::Handshake`], [`Error::Closed`]) after which the
//! session must be dropped, and recoverable ones ([`Error::Server`],
//! [`Error::Application`]) which leave the connection usable.
use std::io;

use thiserror::Error;

use crate::protocol::MyError;

/// Error type returned by [`Handler`](crate::server::Handler) implementations.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Violations of the wire format itself.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid packet sequence {got}, expected {expected}")]
    InvalidSequence { expected: u8, got: u8 },

    #[error("malformed packet")]
    MalformedPacket,

    #[error("unsupported: {0}")]
    Unsupported(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transport IO error: {0}")]
    Transport(#[from] io::Error),

    #[error(transparent)]
    Server(#[from] MyError),

    #[error("handshake failed: {0}")]
    Handshake(Box<Error>),

    #[error("application error: {0}")]
    Application(HandlerError),

    #[error("connection closed")]
    Closed,
}

impl Error {
    /// Returns true when the connection can no longer be used.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Protocol(_) | Error::Transport(_) | Error::Handshake(_) | Error::Closed => {
                true
            }
            Error::Server(_) | Error::Application(_) => false,
        }
    }
}

impl From<HandlerError> for Error {
    fn from(value: HandlerError) -> Self {
        Error::Application(value)
    }
}
