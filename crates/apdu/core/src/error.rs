//! Error type for buffer and APDU framing operations

use thiserror::Error;

/// Errors raised while slicing buffers or framing APDUs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApduError {
    /// A slice request reached past the end of the buffer
    #[error("slice [{offset}..{offset}+{len}] out of bounds for buffer of {size} bytes")]
    OutOfBounds {
        /// Requested start offset
        offset: usize,
        /// Requested length
        len: usize,
        /// Actual buffer size
        size: usize,
    },

    /// Hex text could not be decoded
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Response shorter than the two status bytes
    #[error("incomplete response: {0} bytes")]
    IncompleteResponse(usize),

    /// Command data does not fit a short APDU
    #[error("command data too long: {0} bytes")]
    DataTooLong(usize),
}
