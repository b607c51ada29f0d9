//! Constants used in card management operations
//!
//! This module contains the CLA bytes, instruction codes, parameter values and
//! fixed response layouts used while formatting a token.

/// Class bytes
pub mod cla {
    /// Interindustry class (SELECT)
    pub const ISO7816: u8 = 0x00;
    /// Card manager class
    pub const GP: u8 = 0x80;
    /// Card manager class with secure messaging
    pub const MAC: u8 = 0x84;
    /// CoolKey applet class
    pub const COOLKEY: u8 = 0xB0;
}

/// Instruction bytes, card manager first, then the CoolKey applet
pub mod ins {
    #![allow(missing_docs)]
    pub const SELECT: u8 = 0xA4;
    pub const GET_DATA: u8 = 0xCA;
    pub const INITIALIZE_UPDATE: u8 = 0x50;
    pub const EXTERNAL_AUTHENTICATE: u8 = 0x82;
    pub const DELETE: u8 = 0xE4;
    pub const LOAD: u8 = 0xE8;
    pub const INSTALL: u8 = 0xE6;
    pub const GET_STATUS: u8 = 0x3C;
    pub const GET_VERSION: u8 = 0x70;
    pub const SET_ISSUER_INFO: u8 = 0xF4;
}

/// SELECT P1
pub mod select_p1 {
    /// Select by AID
    pub const BY_NAME: u8 = 0x04;
}

/// INSTALL P1 roles
pub mod install_p1 {
    /// Announce a load file
    pub const FOR_LOAD: u8 = 0x02;
    /// Create the applet instance and make it selectable in one go
    pub const FOR_INSTALL_AND_MAKE_SELECTABLE: u8 = 0x04 | 0x08;
}

/// LOAD P1
pub mod load_p1 {
    /// Further blocks follow
    pub const MORE_BLOCKS: u8 = 0x00;
    /// Final block
    pub const LAST_BLOCK: u8 = 0x80;
}

/// TLV tags
pub mod tags {
    /// AID to delete
    pub const DELETE_AID: u8 = 0x4F;
    /// Load file data block wrapping the package
    pub const LOAD_FILE_DATA_BLOCK: u8 = 0xC4;
    /// System install parameters
    pub const SYSTEM_PARAMETERS: u8 = 0xEF;
    /// Code space limit
    pub const CODE_SPACE_LIMIT: u8 = 0xC6;
    /// Volatile memory limit
    pub const VOLATILE_DATA_LIMIT: u8 = 0xC7;
    /// Persistent memory limit
    pub const NON_VOLATILE_DATA_LIMIT: u8 = 0xC8;
    /// Applet install parameters
    pub const APPLICATION_PARAMETERS: u8 = 0xC9;
    /// CPLC data object, sent as GET DATA P1 P2
    pub const CPLC: u16 = 0x9F7F;
}

/// Byte layouts of fixed-size replies, as `(offset, length)` where relevant
pub mod layout {
    /// INITIALIZE UPDATE reply without status word
    pub const INIT_UPDATE_LEN: usize = 28;
    /// Key diversification data
    pub const DIVERSIFICATION: (usize, usize) = (0, 10);
    /// Key version and protocol
    pub const KEY_INFO: (usize, usize) = (10, 2);
    /// Sequence counter and card challenge
    pub const CARD_CHALLENGE: (usize, usize) = (12, 8);
    /// Card cryptogram
    pub const CARD_CRYPTOGRAM: (usize, usize) = (20, 8);
    /// Host challenge sent in INITIALIZE UPDATE
    pub const HOST_CHALLENGE_LEN: usize = 8;
    /// Raw applet version reply, status word included
    pub const APPLET_VERSION_LEN: usize = 6;
    /// Build id at the start of the version reply
    pub const BUILD_ID_LEN: usize = 4;
    /// Le of the applet GET STATUS command
    pub const STATUS_LEN: u8 = 0x10;
}

/// Security level requested by EXTERNAL AUTHENTICATE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SecurityLevel {
    /// Command MAC only
    #[default]
    Mac,
    /// Command MAC and command data encryption
    MacEnc,
}

impl SecurityLevel {
    /// P1 value of EXTERNAL AUTHENTICATE
    pub const fn p1(self) -> u8 {
        match self {
            Self::Mac => 0x01,
            Self::MacEnc => 0x03,
        }
    }

    /// Whether command data is encrypted
    pub const fn encrypts(self) -> bool {
        matches!(self, Self::MacEnc)
    }
}
