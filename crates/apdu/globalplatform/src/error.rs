//! Errors raised by card commands and the secure channel

use tps_apdu_core::{ApduError, StatusWord, TransportError};
use thiserror::Error;

/// Result type for card management operations
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Error type for card commands and the secure channel
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Key-derivation service refused or failed
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Shared secret missing or session keys could not be unwrapped
    #[error("key unwrap failed: {0}")]
    KeyUnwrap(String),

    /// Card answered with malformed data
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Card answered with a failed status word
    #[error("{command} failed with status {status} ({})", status.description())]
    CardStatus {
        /// Command that failed
        command: &'static str,
        /// Status word returned
        status: StatusWord,
    },

    /// Protected operation attempted before EXTERNAL AUTHENTICATE
    #[error("secure channel not authenticated")]
    NotAuthenticated,

    /// Transport-related errors
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Cryptographic operation failed
    #[error("cryptographic error: {0}")]
    Crypto(&'static str),
}

impl From<ApduError> for ChannelError {
    fn from(error: ApduError) -> Self {
        Self::Protocol(error.to_string())
    }
}

impl ChannelError {
    /// Whether the session to the card broke
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(e) if !matches!(e, TransportError::Apdu(_)))
    }

    pub(crate) fn check(command: &'static str, response: &tps_apdu_core::Response) -> Result<()> {
        if response.is_success() {
            Ok(())
        } else {
            Err(Self::CardStatus {
                command,
                status: response.status(),
            })
        }
    }
}
