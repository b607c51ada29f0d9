//! APDU codec and session transport for token formatting
//!
//! This crate provides the byte-level building blocks used while formatting a
//! token:
//!
//! - [`Buffer`], an immutable byte sequence with bounds-checked slicing
//! - [`Command`] and [`Response`], the ISO/IEC 7816-4 APDU framing
//! - the [`session`] message set exchanged with the token client, its wire
//!   codec and a threaded stream session
//! - [`CardTransport`] and [`SessionTransport`], which carry APDUs to the card
//!   inside token-PDU envelopes
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod buffer;
pub mod command;
pub mod error;
pub mod response;
pub mod session;
pub mod transport;

pub use buffer::Buffer;
pub use command::Command;
pub use error::ApduError;
pub use response::Response;
pub use response::status::StatusWord;
pub use session::{BeginOp, Message, OpType, Session};
pub use transport::{CardTransport, SessionTransport, TransportError};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        ApduError, BeginOp, Buffer, Bytes, BytesMut, CardTransport, Command, Message, OpType,
        Response, Session, SessionTransport, StatusWord, TransportError,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports() {
        let cmd = Command::new(0x00, 0xA4, 0x04, 0x00);
        assert_eq!(cmd.cla, 0x00);
        assert_eq!(cmd.ins, 0xA4);

        let resp = Response::success(Bytes::from_static(&[0x01, 0x02, 0x03]));
        assert!(resp.is_success());
        assert_eq!(resp.payload().as_ref(), &[0x01, 0x02, 0x03]);
        assert_eq!(resp.status(), StatusWord::new(0x90, 0x00));
    }
}
