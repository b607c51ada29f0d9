//! Card responses: payload followed by SW1 SW2

pub mod status;

use bytes::Bytes;
use tracing::trace;

use crate::{ApduError, Buffer};
use status::StatusWord;

/// A card response split into payload and status word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    payload: Buffer,
    status: StatusWord,
}

impl Response {
    /// Response with the given payload and status word
    pub fn new(payload: impl Into<Buffer>, status: impl Into<StatusWord>) -> Self {
        Self {
            payload: payload.into(),
            status: status.into(),
        }
    }

    /// Payload terminated by 90 00
    pub fn success(payload: impl Into<Buffer>) -> Self {
        Self::new(payload, StatusWord::SUCCESS)
    }

    /// Bare status word without payload
    pub fn error(status: impl Into<StatusWord>) -> Self {
        Self::new(Buffer::new(), status)
    }

    /// Split raw card bytes; the last two are the status word
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ApduError> {
        let [payload @ .., sw1, sw2] = raw else {
            return Err(ApduError::IncompleteResponse(raw.len()));
        };
        let response = Self::new(Buffer::from(payload), (*sw1, *sw2));
        trace!(status = %response.status, len = payload.len(), "Card response");
        Ok(response)
    }

    /// Data before the status word
    pub const fn payload(&self) -> &Buffer {
        &self.payload
    }

    /// Trailing status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Whether the card answered 90 00; payload length plays no part
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Raw reply as the card sent it, status word included
    pub fn to_bytes(&self) -> Bytes {
        let mut raw = Vec::with_capacity(self.payload.len() + 2);
        raw.extend_from_slice(&self.payload);
        raw.extend_from_slice(&[self.status.sw1, self.status.sw2]);
        Bytes::from(raw)
    }
}
