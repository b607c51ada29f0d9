//! EXTERNAL AUTHENTICATE command
//!
//! Proves the host cryptogram to the card and sets the channel security level.
//! The command is always sent MAC-protected.

use tps_apdu_core::Command;

use crate::constants::{SecurityLevel, cla, ins};

/// EXTERNAL AUTHENTICATE command builder
#[derive(Debug, Clone, Copy)]
pub struct ExternalAuthenticateCommand;

impl ExternalAuthenticateCommand {
    /// Create an unwrapped EXTERNAL AUTHENTICATE command
    pub fn with_host_cryptogram(
        level: SecurityLevel,
        host_cryptogram: impl AsRef<[u8]>,
    ) -> Command {
        Command::new_with_data(
            cla::GP,
            ins::EXTERNAL_AUTHENTICATE,
            level.p1(),
            0x00,
            host_cryptogram.as_ref().to_vec(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_external_authenticate_command() {
        let cmd = ExternalAuthenticateCommand::with_host_cryptogram(
            SecurityLevel::MacEnc,
            hex!("1d4de92eaf7a2c9f"),
        );
        assert_eq!(
            cmd.to_bytes().unwrap().as_ref(),
            hex!("80820300081d4de92eaf7a2c9f")
        );
    }
}
