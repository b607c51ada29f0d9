//! INITIALIZE UPDATE command
//!
//! Starts a secure channel session: the host sends its challenge and the card
//! answers with the data needed to derive session keys.

use tps_apdu_core::{Buffer, Command, Response};

use crate::{
    ChannelError, Result,
    constants::{cla, ins, layout},
};

/// INITIALIZE UPDATE command builder
#[derive(Debug, Clone, Copy)]
pub struct InitializeUpdateCommand;

impl InitializeUpdateCommand {
    /// Create an INITIALIZE UPDATE command for a key set
    pub fn with_challenge(
        key_version: u8,
        key_index: u8,
        host_challenge: impl AsRef<[u8]>,
    ) -> Command {
        Command::new_with_data(
            cla::GP,
            ins::INITIALIZE_UPDATE,
            key_version,
            key_index,
            host_challenge.as_ref().to_vec(),
        )
        .with_le(0x00)
    }
}

/// Parsed INITIALIZE UPDATE response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeUpdateOk {
    /// Key diversification data
    pub diversification_data: Buffer,
    /// Key version and protocol identifier
    pub key_info: Buffer,
    /// Card challenge
    pub card_challenge: Buffer,
    /// Card cryptogram
    pub card_cryptogram: Buffer,
}

impl InitializeUpdateOk {
    /// Parse a card response, rejecting failed status words and wrong sizes
    pub fn from_response(response: &Response) -> Result<Self> {
        ChannelError::check("INITIALIZE UPDATE", response)?;

        let payload = response.payload();
        if payload.len() != layout::INIT_UPDATE_LEN {
            return Err(ChannelError::Protocol(format!(
                "INITIALIZE UPDATE returned {} bytes, expected {}",
                payload.len(),
                layout::INIT_UPDATE_LEN
            )));
        }

        let field = |(offset, len): (usize, usize)| payload.slice(offset, len);
        Ok(Self {
            diversification_data: field(layout::DIVERSIFICATION)?,
            key_info: field(layout::KEY_INFO)?,
            card_challenge: field(layout::CARD_CHALLENGE)?,
            card_cryptogram: field(layout::CARD_CRYPTOGRAM)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_initialize_update_command() {
        let cmd = InitializeUpdateCommand::with_challenge(0x00, 0x00, hex!("f0467f908e5ca23f"));
        assert_eq!(
            cmd.to_bytes().unwrap().as_ref(),
            hex!("8050000008f0467f908e5ca23f00")
        );
    }

    #[test]
    fn test_parse_response() {
        let response = Response::from_bytes(&hex!(
            "000002650183039536622002000de9c62ba1c4c8e55fcb91b6654ce49000"
        ))
        .unwrap();
        let parsed = InitializeUpdateOk::from_response(&response).unwrap();

        assert_eq!(parsed.diversification_data.as_ref(), hex!("00000265018303953662"));
        assert_eq!(parsed.key_info.as_ref(), hex!("2002"));
        assert_eq!(parsed.card_challenge.as_ref(), hex!("000de9c62ba1c4c8"));
        assert_eq!(parsed.card_cryptogram.as_ref(), hex!("e55fcb91b6654ce4"));
    }

    #[test]
    fn test_wrong_size_is_protocol_error() {
        let response = Response::from_bytes(&hex!("00000265018303953662209000")).unwrap();
        assert!(matches!(
            InitializeUpdateOk::from_response(&response),
            Err(ChannelError::Protocol(_))
        ));
    }

    #[test]
    fn test_failed_status() {
        let response = Response::error((0x6A, 0x88));
        assert!(matches!(
            InitializeUpdateOk::from_response(&response),
            Err(ChannelError::CardStatus { .. })
        ));
    }
}
