//! Card identity derived from the CPLC block

use tps_apdu_core::Buffer;

use crate::{Error, Result, status::TpsStatus};

/// Length of the CPLC block as returned by the card, status word included
pub const CPLC_BLOCK_LEN: usize = 47;

/// Card unique id and manufacturer serial number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIdentity {
    /// Card unique id (10 bytes)
    pub cuid: Buffer,
    /// Manufacturer serial number (4 bytes)
    pub msn: Buffer,
}

impl TokenIdentity {
    /// Extract identifiers from a CPLC block of at least 47 bytes
    ///
    /// The CUID is the IC fabricator and type (bytes 3..7), the IC batch
    /// identifier (19..21) and the IC serial number (15..19); the MSN is taken
    /// from bytes 41..45.
    pub fn from_cplc(block: &[u8]) -> Result<Self> {
        if block.len() < CPLC_BLOCK_LEN {
            return Err(Error::protocol(
                TpsStatus::SecureChannel,
                format!("CPLC block is {} bytes, expected {CPLC_BLOCK_LEN}", block.len()),
            ));
        }
        Ok(Self {
            cuid: Buffer::join([&block[3..7], &block[19..21], &block[15..19]]),
            msn: Buffer::from(&block[41..45]),
        })
    }

    /// CUID as upper-case hex
    pub fn cuid_hex(&self) -> String {
        self.cuid.to_hex()
    }

    /// MSN as upper-case hex
    pub fn msn_hex(&self) -> String {
        self.msn.to_hex()
    }
}
