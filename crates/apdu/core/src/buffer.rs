//! Immutable byte buffer used for protocol payloads and key material
//!
//! All offset-based operations are bounds-checked: a request that does not fit
//! fails with [`ApduError::OutOfBounds`] rather than returning a shorter slice.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use derive_more::Deref;

use crate::ApduError;

/// Immutable, cheaply cloneable byte sequence
#[derive(Clone, Default, PartialEq, Eq, Hash, Deref)]
pub struct Buffer(Bytes);

impl Buffer {
    /// Create an empty buffer
    pub const fn new() -> Self {
        Self(Bytes::new())
    }

    /// Create a buffer from a static byte slice
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }

    /// Parse a buffer from hex text (case-insensitive, no separators)
    pub fn from_hex(text: &str) -> Result<Self, ApduError> {
        hex::decode(text.trim())
            .map(Self::from)
            .map_err(|e| ApduError::InvalidHex(e.to_string()))
    }

    /// Copy `len` bytes starting at `offset` into a new buffer
    pub fn slice(&self, offset: usize, len: usize) -> Result<Self, ApduError> {
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= self.0.len())
            .ok_or(ApduError::OutOfBounds {
                offset,
                len,
                size: self.0.len(),
            })?;
        Ok(Self(self.0.slice(offset..end)))
    }

    /// Return a new buffer with `other` appended
    pub fn concat(&self, other: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(self.0.len() + other.len());
        buf.put_slice(&self.0);
        buf.put_slice(other);
        Self(buf.freeze())
    }

    /// Concatenate several parts into one buffer
    pub fn join<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut buf = BytesMut::new();
        for part in parts {
            buf.put_slice(part);
        }
        Self(buf.freeze())
    }

    /// Read a single byte
    pub fn at(&self, offset: usize) -> Result<u8, ApduError> {
        self.0.get(offset).copied().ok_or(ApduError::OutOfBounds {
            offset,
            len: 1,
            size: self.0.len(),
        })
    }

    /// Render as upper-case hex
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.0)
    }

    /// Access the underlying [`Bytes`]
    pub const fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    /// Unwrap into the underlying [`Bytes`]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Buffer({})", self.to_hex())
    }
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<Bytes> for Buffer {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&[u8]> for Buffer {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

impl From<Buffer> for Bytes {
    fn from(buffer: Buffer) -> Self {
        buffer.0
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_slice_within_bounds() {
        let buf = Buffer::from(hex!("0001020304050607").to_vec());
        assert_eq!(buf.slice(2, 3).unwrap().as_ref(), &hex!("020304"));
        assert_eq!(buf.slice(8, 0).unwrap().len(), 0);
        assert_eq!(buf.slice(0, 8).unwrap(), buf);
    }

    #[test]
    fn test_slice_out_of_bounds() {
        let buf = Buffer::from(hex!("00010203").to_vec());
        assert_eq!(
            buf.slice(2, 3),
            Err(ApduError::OutOfBounds {
                offset: 2,
                len: 3,
                size: 4
            })
        );
        assert!(buf.slice(usize::MAX, 2).is_err());
        assert!(buf.at(4).is_err());
    }

    #[test]
    fn test_concat_and_hex() {
        let a = Buffer::from_hex("a0b1").unwrap();
        let joined = a.concat(&hex!("c2"));
        assert_eq!(joined.to_hex(), "A0B1C2");
        assert_eq!(
            Buffer::join([&hex!("01")[..], &hex!("0203")[..]]).to_hex(),
            "010203"
        );
        assert!(Buffer::from_hex("zz").is_err());
    }
}
