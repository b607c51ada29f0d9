//! Applet load file
//!
//! The package goes to the card as one load file data block, `C4`, a BER
//! length and the package bytes, cut into numbered LOAD blocks.

use crate::{ChannelError, Result, constants::tags};

/// LOAD block size used when none is configured
pub const DEFAULT_BLOCK_SIZE: usize = 242;

/// The block number is a single byte
const MAX_BLOCKS: usize = 256;

/// Encoded load file ready to be cut into LOAD blocks
#[derive(Debug)]
pub struct LoadFile {
    encoded: Vec<u8>,
    block_size: usize,
}

/// One LOAD block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadBlock<'a> {
    /// Block number (P2)
    pub number: u8,
    /// Whether this block closes the file
    pub last: bool,
    /// Block bytes
    pub data: &'a [u8],
    /// Encoded bytes covered once this block is sent
    pub end: usize,
}

impl LoadFile {
    /// Wrap `package` and check that it fits in addressable blocks
    pub fn new(package: &[u8], block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(ChannelError::Protocol("LOAD block size must be positive".into()));
        }

        let mut encoded = vec![tags::LOAD_FILE_DATA_BLOCK];
        encoded.extend(ber_length(package.len()));
        encoded.extend_from_slice(package);

        let file = Self {
            encoded,
            block_size,
        };
        if file.blocks_count() > MAX_BLOCKS {
            return Err(ChannelError::Protocol(format!(
                "load file needs {} blocks of {block_size} bytes, at most {MAX_BLOCKS} allowed",
                file.blocks_count()
            )));
        }
        Ok(file)
    }

    /// Number of LOAD commands needed
    pub fn blocks_count(&self) -> usize {
        self.encoded.len().div_ceil(self.block_size)
    }

    /// Encoded length, tag and length prefix included
    pub fn total_len(&self) -> usize {
        self.encoded.len()
    }

    /// Blocks in sending order
    pub fn blocks(&self) -> impl Iterator<Item = LoadBlock<'_>> {
        let count = self.blocks_count();
        self.encoded
            .chunks(self.block_size)
            .enumerate()
            .map(move |(index, data)| LoadBlock {
                // At most MAX_BLOCKS, checked in new
                number: index as u8,
                last: index + 1 == count,
                data,
                end: index * self.block_size + data.len(),
            })
    }
}

/// BER-TLV length octets
fn ber_length(len: usize) -> Vec<u8> {
    let be = (len as u32).to_be_bytes();
    match len {
        0..0x80 => vec![be[3]],
        0x80..0x100 => vec![0x81, be[3]],
        0x100..0x10000 => vec![0x82, be[2], be[3]],
        _ => vec![0x83, be[1], be[2], be[3]],
    }
}

/// Percentage reached inside `(start, end)` once `sent` of `total` bytes went out
pub fn progress((start, end): (u8, u8), sent: usize, total: usize) -> u8 {
    if total == 0 || end <= start {
        return end;
    }
    let span = usize::from(end - start);
    start + (sent.min(total) * span / total) as u8
}
