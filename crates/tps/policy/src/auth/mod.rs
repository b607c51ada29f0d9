//! Operator authentication
//!
//! Credentials are collected from the token client with a plain or extended
//! login exchange, renamed to what the backend expects through each UI
//! parameter's credential map, then checked by the authenticator's backend.

pub mod authenticator;
pub mod backend;
pub mod login;
pub mod params;

use std::fmt;

use thiserror::Error;
use tps_apdu_core::{TransportError, session::Fields};

use crate::config::ConfigError;

pub use authenticator::{Authenticator, AuthenticatorRegistry};
pub use backend::{AuthBackend, ExternalAuth, PasswordTable};
pub use login::{authenticate, collect_credentials};
pub use params::{CredMap, UiParameter};

/// Field of an [`AuthToken`] naming the authenticated user
pub const USERID_FIELD: &str = "userid";

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// No authenticator with this id
    #[error("unknown authenticator {0}")]
    UnknownAuthenticator(String),

    /// The client did not supply a required credential
    #[error("missing credential {0}")]
    MissingCredential(String),

    /// Credentials were rejected
    #[error("invalid credentials for {0}")]
    InvalidCredentials(String),

    /// The client answered with the wrong message
    #[error("expected {expected}, got {actual}")]
    UnexpectedMessage {
        /// Expected message
        expected: &'static str,
        /// Received message
        actual: &'static str,
    },

    /// External backend failure
    #[error("authentication backend failed: {0}")]
    Backend(String),

    /// Session to the client broke
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Authenticator configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Credentials keyed by backend credential name
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials(Fields);

impl Credentials {
    /// Create an empty credential set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a credential
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Look up a credential
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Look up a credential, failing when absent
    pub fn require(&self, name: &str) -> Result<&str, AuthError> {
        self.get(name).ok_or_else(|| AuthError::MissingCredential(name.to_string()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// Result of a successful authentication, kept for one attempt only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthToken(Fields);

impl AuthToken {
    /// Token for a user
    pub fn for_user(user: impl Into<String>) -> Self {
        let mut fields = Fields::new();
        fields.insert(USERID_FIELD.to_string(), user.into());
        Self(fields)
    }

    /// Add a field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Look up a field
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Authenticated user id
    pub fn user_id(&self) -> Option<&str> {
        self.get(USERID_FIELD)
    }
}
