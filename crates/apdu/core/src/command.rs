//! Short APDU commands (ISO/IEC 7816-4)

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::ApduError;

/// Largest data field a short APDU can carry
pub const MAX_DATA_LEN: usize = 255;

/// A card command: four header bytes, optional data, optional Le
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Data field
    pub data: Option<Bytes>,
    /// Expected response length
    pub le: Option<u8>,
}

impl Command {
    /// Header-only command
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Command with an Le byte and no data
    pub const fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: u8) -> Self {
        Self::new(cla, ins, p1, p2).with_le(le)
    }

    /// Command carrying a data field
    pub fn new_with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: impl Into<Bytes>) -> Self {
        Self::new(cla, ins, p1, p2).with_data(data)
    }

    /// Replace the data field
    pub fn with_data(self, data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
            ..self
        }
    }

    /// Replace the Le byte
    pub const fn with_le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// Data field, empty when absent
    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    /// Encode as `CLA INS P1 P2 [Lc data] [Le]`
    ///
    /// Fails when the data field does not fit a one-byte Lc.
    pub fn to_bytes(&self) -> Result<Bytes, ApduError> {
        let data = self.data.as_deref();
        let mut out = BytesMut::with_capacity(6 + data.map_or(0, <[u8]>::len));
        out.put_slice(&[self.cla, self.ins, self.p1, self.p2]);

        if let Some(data) = data {
            if data.len() > MAX_DATA_LEN {
                return Err(ApduError::DataTooLong(data.len()));
            }
            out.put_u8(data.len() as u8);
            out.put_slice(data);
        }
        if let Some(le) = self.le {
            out.put_u8(le);
        }

        Ok(out.freeze())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}{:02X}{:02X}", self.cla, self.ins, self.p1, self.p2)?;
        match &self.data {
            Some(data) => write!(f, " Lc={}", data.len()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_select_with_le_encoding() {
        let cmd = Command::new_with_data(0x00, 0xA4, 0x04, 0x00, hex!("A0000000030000").to_vec())
            .with_le(0);
        assert_eq!(cmd.to_bytes().unwrap().as_ref(), &hex!("00A4040007A000000003000000"));
        assert_eq!(cmd.to_string(), "00A40400 Lc=7");
    }

    #[test]
    fn test_header_and_le_only() {
        let header = Command::new(0x80, 0xCA, 0x9F, 0x7F);
        assert_eq!(header.to_bytes().unwrap().as_ref(), &hex!("80CA9F7F"));
        let cmd = Command::new_with_le(0xB0, 0x3C, 0x00, 0x00, 0x10);
        assert!(cmd.data().is_empty());
        assert_eq!(cmd.to_bytes().unwrap().as_ref(), &hex!("B03C000010"));
    }

    #[test]
    fn test_data_too_long_is_rejected() {
        let cmd = Command::new_with_data(0x80, 0xE8, 0x00, 0x00, vec![0u8; 256]);
        assert_eq!(cmd.to_bytes(), Err(ApduError::DataTooLong(256)));

        let cmd = Command::new_with_data(0x80, 0xE8, 0x00, 0x00, vec![0u8; 255]);
        assert_eq!(cmd.to_bytes().unwrap().len(), 260);
    }
}
