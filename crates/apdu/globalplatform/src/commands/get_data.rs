//! GET DATA command
//!
//! Used to read the card production life cycle (CPLC) identity block.

use tps_apdu_core::Command;

use crate::constants::{cla, ins, tags};

/// Expected length of the CPLC data object
const CPLC_LE: u8 = 0x2D;

/// GET DATA command builder
#[derive(Debug, Clone, Copy)]
pub struct GetDataCommand;

impl GetDataCommand {
    /// Read a data object by its two-byte tag
    pub const fn with_tag(tag: u16, le: u8) -> Command {
        Command::new_with_le(cla::GP, ins::GET_DATA, (tag >> 8) as u8, tag as u8, le)
    }

    /// Read the CPLC identity block
    pub const fn cplc() -> Command {
        Self::with_tag(tags::CPLC, CPLC_LE)
    }
}
