//! Commands understood by the token applet
//!
//! These are proprietary to the applet being provisioned: status and version
//! queries sent in the clear, and SET ISSUER INFO sent through the secure
//! channel.

use tps_apdu_core::Command;

use crate::constants::{cla, ins, layout};

/// Token applet command builder
#[derive(Debug, Clone, Copy)]
pub struct CoolKeyCommand;

impl CoolKeyCommand {
    /// Read card and applet versions
    pub const fn get_status() -> Command {
        Command::new_with_le(cla::COOLKEY, ins::GET_STATUS, 0x00, 0x00, layout::STATUS_LEN)
    }

    /// Read the applet build id
    pub const fn get_version() -> Command {
        Command::new_with_le(cla::COOLKEY, ins::GET_VERSION, 0x00, 0x00, 0x00)
    }

    /// Write issuer information
    pub fn set_issuer_info(info: impl AsRef<[u8]>) -> Command {
        Command::new_with_data(
            cla::MAC,
            ins::SET_ISSUER_INFO,
            0x00,
            0x00,
            info.as_ref().to_vec(),
        )
    }
}

/// Versions reported by the applet status reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppletStatus {
    /// Card protocol major version
    pub major: u8,
    /// Card protocol minor version
    pub minor: u8,
    /// Applet major version
    pub applet_major: u8,
    /// Applet minor version
    pub applet_minor: u8,
}

impl AppletStatus {
    /// Parse the raw status reply; fewer than four bytes yields all zeros
    pub fn from_reply(raw: &[u8]) -> Self {
        match raw {
            [major, minor, applet_major, applet_minor, ..] => Self {
                major: *major,
                minor: *minor,
                applet_major: *applet_major,
                applet_minor: *applet_minor,
            },
            _ => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_status_and_version_commands() {
        assert_eq!(
            CoolKeyCommand::get_status().to_bytes().unwrap().as_ref(),
            hex!("B03C000010")
        );
        assert_eq!(
            CoolKeyCommand::get_version().to_bytes().unwrap().as_ref(),
            hex!("B070000000")
        );
        assert_eq!(
            CoolKeyCommand::set_issuer_info(b"abc").to_bytes().unwrap().as_ref(),
            hex!("84F4000003616263")
        );
    }

    #[test]
    fn test_applet_status() {
        let status = AppletStatus::from_reply(&hex!("01020304AABB9000"));
        assert_eq!(
            status,
            AppletStatus {
                major: 1,
                minor: 2,
                applet_major: 3,
                applet_minor: 4
            }
        );
        assert_eq!(AppletStatus::from_reply(&hex!("6D00")), AppletStatus::default());
        assert_eq!(AppletStatus::from_reply(&hex!("010203")), AppletStatus::default());
    }
}
