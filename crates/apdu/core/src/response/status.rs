//! Status words returned by the card

use std::fmt;

/// Status Word (SW1-SW2) closing every card response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// First status byte (SW1)
    pub sw1: u8,
    /// Second status byte (SW2)
    pub sw2: u8,
}

impl StatusWord {
    /// Normal completion (90 00)
    pub const SUCCESS: Self = Self::new(0x90, 0x00);

    /// Create a new status word
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Whether this is exactly 90 00
    ///
    /// Warnings such as `61xx` or `63xx` are failures for every caller here.
    pub const fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }

    /// Whether the card reports the addressed AID or object as absent
    pub const fn is_not_found(&self) -> bool {
        matches!((self.sw1, self.sw2), (0x6A, 0x82) | (0x6A, 0x88))
    }

    /// Short description of the status words met while formatting a token
    pub const fn description(&self) -> &'static str {
        match (self.sw1, self.sw2) {
            (0x90, 0x00) => "success",
            (0x63, _) => "cryptogram verification failed",
            (0x65, 0x81) => "memory failure",
            (0x67, 0x00) => "wrong length",
            (0x69, 0x82) => "security status not satisfied",
            (0x69, 0x85) => "conditions of use not satisfied",
            (0x6A, 0x80) => "incorrect data",
            (0x6A, 0x82) => "application not found",
            (0x6A, 0x84) => "not enough memory",
            (0x6A, 0x86) => "incorrect P1-P2",
            (0x6A, 0x88) => "referenced data not found",
            (0x6D, 0x00) => "instruction not supported",
            (0x6E, 0x00) => "class not supported",
            _ => "unexpected status",
        }
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from((sw1, sw2): (u8, u8)) -> Self {
        Self::new(sw1, sw2)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.sw1, self.sw2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_9000_is_success() {
        assert!(StatusWord::SUCCESS.is_success());
        for (sw1, sw2) in [(0x90, 0x01), (0x61, 0x00), (0x63, 0x00), (0x91, 0x00), (0x00, 0x90)] {
            assert!(!StatusWord::new(sw1, sw2).is_success(), "{sw1:02X}{sw2:02X}");
        }
    }

    #[test]
    fn test_not_found_and_rendering() {
        assert!(StatusWord::from((0x6A, 0x82)).is_not_found());
        assert!(StatusWord::from((0x6A, 0x88)).is_not_found());
        assert!(!StatusWord::from((0x69, 0x85)).is_not_found());
        assert_eq!(StatusWord::new(0x6a, 0x88).to_string(), "6A88");
        assert_eq!(StatusWord::new(0x63, 0x10).description(), "cryptogram verification failed");
    }
}
