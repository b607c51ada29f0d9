//! SELECT command
//!
//! This command is used to select an application by its AID.

use tps_apdu_core::Command;

use crate::constants::{cla, ins, select_p1};

/// SELECT command builder
#[derive(Debug, Clone, Copy)]
pub struct SelectCommand;

impl SelectCommand {
    /// Select an application by AID
    pub fn with_aid(aid: impl AsRef<[u8]>) -> Command {
        Self::new_with_params(select_p1::BY_NAME, 0x00, aid)
    }

    /// Create a SELECT command with specific P1, P2, and AID
    pub fn new_with_params(p1: u8, p2: u8, aid: impl AsRef<[u8]>) -> Command {
        Command::new_with_data(cla::ISO7816, ins::SELECT, p1, p2, aid.as_ref().to_vec())
    }
}
