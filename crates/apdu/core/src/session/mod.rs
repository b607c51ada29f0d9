//! Messages exchanged with the token client and the session abstraction
//!
//! A [`Session`] is a half-duplex, ordered stream of [`Message`]s. Every
//! request is answered by exactly one response before the next request is
//! written; exclusive `&mut` access enforces that no two requests are ever
//! outstanding.

pub mod codec;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod stream;

use std::collections::BTreeMap;

use derive_more::Display;
use tracing::trace;

use crate::{Buffer, TransportError};

pub use codec::CodecError;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockSession;
pub use stream::StreamSession;

/// Named string fields carried by login responses and auth tokens
pub type Fields = BTreeMap<String, String>;

/// Extension announcing the client can show status updates
pub const STATUS_UPDATE_EXTENSION: &str = "statusUpdate";
/// Extension announcing the client supports extended login
pub const EXTENDED_LOGIN_EXTENSION: &str = "extendedLoginRequest";
/// Extension carrying the client locale
pub const LOCALE_EXTENSION: &str = "locale";
/// Extension carrying a client-selected token type
pub const TOKEN_TYPE_EXTENSION: &str = "tokenType";
/// Extension carrying the token ATR
pub const TOKEN_ATR_EXTENSION: &str = "tokenATR";
/// Extension carrying the client version
pub const CLIENT_VERSION_EXTENSION: &str = "clientVersion";

/// Token operation requested by a begin-operation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum OpType {
    /// Enroll certificates onto the token
    #[display("enroll")]
    Enroll,
    /// Unblock the token PIN
    #[display("unblock")]
    Unblock,
    /// Reset the token PIN
    #[display("resetPin")]
    ResetPin,
    /// Renew certificates
    #[display("renew")]
    Renew,
    /// Format the token
    #[display("format")]
    Format,
}

impl OpType {
    /// Numeric operation code used on the wire
    pub const fn code(self) -> u8 {
        match self {
            Self::Enroll => 1,
            Self::Unblock => 2,
            Self::ResetPin => 3,
            Self::Renew => 4,
            Self::Format => 5,
        }
    }

    /// Look up an operation by its wire code
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Enroll),
            2 => Some(Self::Unblock),
            3 => Some(Self::ResetPin),
            4 => Some(Self::Renew),
            5 => Some(Self::Format),
            _ => None,
        }
    }
}

/// Start-of-operation message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginOp {
    /// Requested operation
    pub op: OpType,
    /// Client hints keyed by extension name
    pub extensions: BTreeMap<String, String>,
}

impl BeginOp {
    /// Begin-operation without extensions
    pub const fn new(op: OpType) -> Self {
        Self {
            op,
            extensions: BTreeMap::new(),
        }
    }

    /// Add an extension
    pub fn with_extension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(name.into(), value.into());
        self
    }

    /// Look up an extension by name
    pub fn extension(&self, name: &str) -> Option<&str> {
        self.extensions.get(name).map(String::as_str)
    }

    /// Whether the client asked for progress updates
    pub fn wants_status_update(&self) -> bool {
        self.extension(STATUS_UPDATE_EXTENSION) == Some("true")
    }

    /// Whether the client supports the extended login exchange
    pub fn wants_extended_login(&self) -> bool {
        self.extension(EXTENDED_LOGIN_EXTENSION).is_some()
    }

    /// Client locale, `en` when not declared
    pub fn locale(&self) -> &str {
        self.extension(LOCALE_EXTENSION).unwrap_or("en")
    }
}

/// Extended login request sent to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedLoginRequest {
    /// Whether the previous password was invalid
    pub invalid_pw: u8,
    /// Whether the account is blocked
    pub blocked: u8,
    /// Localized title
    pub title: String,
    /// Localized description
    pub description: String,
    /// Rendered UI parameters
    pub parameters: Vec<String>,
}

/// Messages of the token session protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Start of an operation
    BeginOp(BeginOp),
    /// Ask the client for a login id and password
    LoginRequest {
        /// Whether the previous password was invalid
        invalid_pw: u8,
        /// Whether the account is blocked
        blocked: u8,
    },
    /// Credentials returned by the client
    LoginResponse(Fields),
    /// Ask the client for a localized parameter set
    ExtendedLoginRequest(ExtendedLoginRequest),
    /// Parameter values returned by the client
    ExtendedLoginResponse(Fields),
    /// APDU to forward to the card
    TokenPduRequest(Buffer),
    /// Raw card response (payload plus status word)
    TokenPduResponse(Buffer),
    /// Progress update for the client
    StatusUpdateRequest {
        /// Percent complete
        status: u8,
        /// Human-readable step description
        info: String,
    },
    /// Acknowledgement of a progress update
    StatusUpdateResponse {
        /// Echoed progress value
        status: u8,
    },
    /// End of an operation
    EndOp {
        /// Operation that ended
        op: OpType,
        /// Overall result, zero on success
        result: u8,
        /// Status code reported to the client
        message: u32,
    },
}

impl Message {
    /// Numeric `msg_type` code
    pub const fn msg_type(&self) -> u8 {
        match self {
            Self::BeginOp(_) => 2,
            Self::LoginRequest { .. } => 3,
            Self::LoginResponse(_) => 4,
            Self::TokenPduRequest(_) => 9,
            Self::TokenPduResponse(_) => 10,
            Self::EndOp { .. } => 13,
            Self::StatusUpdateRequest { .. } => 14,
            Self::StatusUpdateResponse { .. } => 15,
            Self::ExtendedLoginRequest(_) => 16,
            Self::ExtendedLoginResponse(_) => 17,
        }
    }

    /// Short name used in logs and errors
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BeginOp(_) => "BeginOp",
            Self::LoginRequest { .. } => "LoginRequest",
            Self::LoginResponse(_) => "LoginResponse",
            Self::TokenPduRequest(_) => "TokenPduRequest",
            Self::TokenPduResponse(_) => "TokenPduResponse",
            Self::EndOp { .. } => "EndOp",
            Self::StatusUpdateRequest { .. } => "StatusUpdateRequest",
            Self::StatusUpdateResponse { .. } => "StatusUpdateResponse",
            Self::ExtendedLoginRequest(_) => "ExtendedLoginRequest",
            Self::ExtendedLoginResponse(_) => "ExtendedLoginResponse",
        }
    }
}

/// Half-duplex message stream to the token client
pub trait Session {
    /// Write one message
    fn write(&mut self, message: Message) -> Result<(), TransportError>;

    /// Block until the next message arrives
    fn read(&mut self) -> Result<Message, TransportError>;

    /// Write a request and block for its paired response
    fn exchange(&mut self, request: Message) -> Result<Message, TransportError> {
        trace!(request = request.name(), "Session exchange");
        self.write(request)?;
        self.read()
    }
}

impl<S: Session + ?Sized> Session for &mut S {
    fn write(&mut self, message: Message) -> Result<(), TransportError> {
        (**self).write(message)
    }

    fn read(&mut self) -> Result<Message, TransportError> {
        (**self).read()
    }
}

impl<S: Session + ?Sized> Session for Box<S> {
    fn write(&mut self, message: Message) -> Result<(), TransportError> {
        (**self).write(message)
    }

    fn read(&mut self) -> Result<Message, TransportError> {
        (**self).read()
    }
}
