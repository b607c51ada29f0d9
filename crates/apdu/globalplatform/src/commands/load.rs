//! LOAD command
//!
//! Carries one block of the load file; the last block sets P1 bit 8.

use tps_apdu_core::Command;

use crate::constants::{cla, ins, load_p1};

/// LOAD command builder
#[derive(Debug, Clone, Copy)]
pub struct LoadCommand;

impl LoadCommand {
    /// Create a LOAD command for one block
    pub fn with_block(is_last: bool, block_number: u8, block: impl AsRef<[u8]>) -> Command {
        let p1 = if is_last {
            load_p1::LAST_BLOCK
        } else {
            load_p1::MORE_BLOCKS
        };
        Command::new_with_data(cla::GP, ins::LOAD, p1, block_number, block.as_ref().to_vec())
    }
}
