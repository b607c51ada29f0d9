//! Reaching the card
//!
//! The card sits behind the token client: each command travels in a token-PDU
//! request and the card's answer returns in the paired token-PDU response.

pub mod error;

use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

use crate::{Buffer, Command, Message, Response, Session};

/// Anything that can carry one APDU to the card and bring back its answer
///
/// Status words are not interpreted here; callers decide what a failed status
/// means for them.
pub trait CardTransport {
    /// Exchange raw APDU bytes for the raw reply
    fn exchange_apdu(&mut self, apdu: &[u8]) -> Result<Bytes, TransportError>;

    /// Encode `command`, exchange it and split the reply
    fn send(&mut self, command: &Command) -> Result<Response, TransportError> {
        let apdu = command.to_bytes()?;
        trace!(apdu = %hex::encode_upper(&apdu), "To card");
        let raw = self
            .exchange_apdu(&apdu)
            .inspect_err(|e| debug!(%command, error = %e, "APDU exchange failed"))?;
        trace!(reply = %hex::encode_upper(&raw), "From card");

        let response = Response::from_bytes(&raw)?;
        debug!(%command, status = %response.status(), "Card exchange");
        Ok(response)
    }
}

impl<T: CardTransport + ?Sized> CardTransport for &mut T {
    fn exchange_apdu(&mut self, apdu: &[u8]) -> Result<Bytes, TransportError> {
        (**self).exchange_apdu(apdu)
    }
}

/// Card transport tunnelled through a token session
#[derive(Debug)]
pub struct SessionTransport<S> {
    session: S,
}

impl<S: Session> SessionTransport<S> {
    /// Wrap a session
    pub const fn new(session: S) -> Self {
        Self { session }
    }

    /// Access the session for non-APDU messages
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Unwrap into the session
    pub fn into_inner(self) -> S {
        self.session
    }
}

impl<S: Session> CardTransport for SessionTransport<S> {
    fn exchange_apdu(&mut self, apdu: &[u8]) -> Result<Bytes, TransportError> {
        let request = Message::TokenPduRequest(Buffer::from(apdu));
        match self.session.exchange(request)? {
            Message::TokenPduResponse(pdu) => Ok(pdu.into_bytes()),
            other => Err(TransportError::UnexpectedMessage {
                expected: "TokenPduResponse",
                actual: other.name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ApduError, session::MockSession};
    use hex_literal::hex;

    #[test]
    fn test_send_wraps_command_in_token_pdu() {
        let mut session = MockSession::default();
        session.push_card(Response::new(hex!("0102").to_vec(), (0x90, 0x00)));

        let mut transport = SessionTransport::new(&mut session);
        let command =
            Command::new_with_data(0x00, 0xA4, 0x04, 0x00, hex!("A0000000030000").to_vec());
        let response = transport.send(&command).unwrap();

        assert!(response.is_success());
        assert_eq!(response.payload().as_ref(), &hex!("0102"));
        assert_eq!(
            session.sent_apdus()[0].as_ref(),
            &hex!("00A4040007A0000000030000")
        );
    }

    #[test]
    fn test_failed_status_is_not_an_error() {
        let mut session = MockSession::default();
        session.push_card(Response::error((0x6A, 0x82)));

        let mut transport = SessionTransport::new(&mut session);
        let response = transport.send(&Command::new(0x00, 0xA4, 0x04, 0x00)).unwrap();
        assert!(!response.is_success());
    }

    #[test]
    fn test_wrong_reply_type() {
        let mut session = MockSession::new([Message::StatusUpdateResponse { status: 10 }]);
        let mut transport = SessionTransport::new(&mut session);
        let err = transport.send(&Command::new(0x00, 0xA4, 0x04, 0x00)).unwrap_err();
        assert!(matches!(
            err,
            TransportError::UnexpectedMessage {
                expected: "TokenPduResponse",
                actual: "StatusUpdateResponse"
            }
        ));
    }

    #[test]
    fn test_io_break_propagates() {
        let mut session = MockSession::default();
        let mut transport = SessionTransport::new(&mut session);
        assert!(matches!(
            transport.send(&Command::new(0x00, 0xA4, 0x04, 0x00)),
            Err(TransportError::Closed)
        ));
        assert!(matches!(
            transport.send(&Command::new_with_data(0x80, 0xE8, 0, 0, vec![0u8; 300])),
            Err(TransportError::Apdu(ApduError::DataTooLong(300)))
        ));
    }
}
