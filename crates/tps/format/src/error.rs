//! Workflow errors and their client-facing status

use std::{io, path::PathBuf};

use derive_more::Display;
use thiserror::Error;
use tps_apdu_core::TransportError;
use tps_apdu_globalplatform::ChannelError;
use tps_policy::{AuthError, ConfigError, ResolveError};

use crate::{state::FormatState, status::TpsStatus};

/// Result type for workflow steps
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Explicit policy refusals
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Denial {
    /// Token is not in the directory and unknown tokens are refused
    #[display("unknown token")]
    UnknownToken,
    /// Token carries no applet and empty tokens are refused
    #[display("token without applet")]
    NoAppletToken,
    /// Token profile is not enabled
    #[display("profile {_0} is disabled")]
    ProfileDisabled(String),
}

impl Denial {
    /// Status reported for the refusal
    pub const fn status(&self) -> TpsStatus {
        match self {
            Self::UnknownToken => TpsStatus::TokenDisabled,
            Self::NoAppletToken => TpsStatus::DisabledToken,
            Self::ProfileDisabled(_) => TpsStatus::Misconfiguration,
        }
    }
}

/// Workflow error
#[derive(Debug, Error)]
pub enum Error {
    /// Session to the client broke
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Card answered unexpectedly
    #[error("{message}")]
    Protocol {
        /// Status reported for this step
        status: TpsStatus,
        /// What went wrong
        message: String,
    },

    /// Secure channel failure
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Operator authentication failed
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    /// Policy refused the token
    #[error("policy denied: {0}")]
    PolicyDenied(Denial),

    /// Missing or invalid setting
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// Token type could not be resolved
    #[error(transparent)]
    Resolution(#[from] ResolveError),

    /// Applet file could not be read
    #[error("cannot read applet file {}: {source}", path.display())]
    AppletFile {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn protocol(status: TpsStatus, message: impl Into<String>) -> Self {
        Self::Protocol {
            status,
            message: message.into(),
        }
    }

    /// Status reported to the client
    pub fn status(&self) -> TpsStatus {
        match self {
            Self::Transport(_) => TpsStatus::Connection,
            Self::Protocol { status, .. } => *status,
            Self::Channel(e) if e.is_transport() => TpsStatus::Connection,
            Self::Channel(_) => TpsStatus::SecureChannel,
            Self::Authentication(_) => TpsStatus::Login,
            Self::PolicyDenied(denial) => denial.status(),
            Self::Configuration(_) => TpsStatus::ContactAdmin,
            Self::Resolution(_) => TpsStatus::DefaultTokenTypeNotFound,
            Self::AppletFile { .. } => TpsStatus::UpgradeApplet,
        }
    }
}

/// Outcome of a failed workflow as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("format failed after {state} with status {status}")]
pub struct Failure {
    /// Reported status
    pub status: TpsStatus,
    /// Last state reached
    pub state: FormatState,
}
