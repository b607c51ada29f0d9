//! Status codes reported to the token client

use derive_more::Display;

/// Outcome code carried in the end-of-operation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum TpsStatus {
    /// Operation completed
    #[display("success")]
    Success,
    /// Session to the client broke
    #[display("connection error")]
    Connection,
    /// Operator login failed
    #[display("login error")]
    Login,
    /// Token is not allowed
    #[display("token disabled")]
    TokenDisabled,
    /// Secure channel could not be used
    #[display("secure channel error")]
    SecureChannel,
    /// Token profile is misconfigured or disabled
    #[display("misconfiguration")]
    Misconfiguration,
    /// Applet upgrade failed
    #[display("applet upgrade error")]
    UpgradeApplet,
    /// No token type could be determined
    #[display("default token type not found")]
    DefaultTokenTypeNotFound,
    /// Token without applet is not allowed
    #[display("disabled token")]
    DisabledToken,
    /// Server-side problem the operator cannot fix
    #[display("contact administrator")]
    ContactAdmin,
}

impl TpsStatus {
    /// Numeric code on the wire
    pub const fn code(self) -> u32 {
        match self {
            Self::Success => 0,
            Self::Connection => 13,
            Self::Login => 14,
            Self::TokenDisabled => 16,
            Self::SecureChannel => 17,
            Self::Misconfiguration => 18,
            Self::UpgradeApplet => 19,
            Self::DefaultTokenTypeNotFound => 22,
            Self::DisabledToken => 25,
            Self::ContactAdmin => 34,
        }
    }
}
