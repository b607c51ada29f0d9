//! DELETE command
//!
//! This command is used to delete applet instances and packages.

use iso7816_tlv::simple::{Tag, Tlv};
use tps_apdu_core::Command;

use crate::{
    ChannelError, Result,
    constants::{cla, ins, tags},
};

/// DELETE command builder
#[derive(Debug, Clone, Copy)]
pub struct DeleteCommand;

impl DeleteCommand {
    /// Delete an object by AID
    pub fn delete_object(aid: impl AsRef<[u8]>) -> Result<Command> {
        let tag = Tag::try_from(tags::DELETE_AID)
            .map_err(|_| ChannelError::Protocol("invalid DELETE tag".into()))?;
        let tlv = Tlv::new(tag, aid.as_ref().to_vec())
            .map_err(|e| ChannelError::Protocol(format!("invalid AID for DELETE: {e}")))?;

        Ok(Command::new_with_data(cla::GP, ins::DELETE, 0x00, 0x00, tlv.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_delete_command() {
        let cmd = DeleteCommand::delete_object(hex!("627601FF000000")).unwrap();
        assert_eq!(
            cmd.to_bytes().unwrap().as_ref(),
            hex!("80E40000094F07627601FF000000")
        );
    }
}
