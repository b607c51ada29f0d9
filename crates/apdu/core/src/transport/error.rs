//! Error types for the session transport

use thiserror::Error;

use crate::{ApduError, session::CodecError};

/// Transport error type
///
/// Any I/O break surfaces here and is propagated unmodified; the transport
/// never retries.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying stream failed
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Frame could not be encoded or decoded
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Session closed by the peer
    #[error("session closed")]
    Closed,

    /// Peer answered with the wrong message type
    #[error("expected {expected}, got {actual}")]
    UnexpectedMessage {
        /// Message the transport waited for
        expected: &'static str,
        /// Message that arrived
        actual: &'static str,
    },

    /// Card response could not be framed
    #[error(transparent)]
    Apdu(#[from] ApduError),
}
