//! Workflow states and the per-attempt state value

use derive_more::Display;
use tps_apdu_core::{Buffer, OpType};
use tps_apdu_globalplatform::AppletStatus;

use crate::{identity::TokenIdentity, status::TpsStatus};

/// Token type used when nothing selects one
pub const DEFAULT_TOKEN_TYPE: &str = "tokenType";

/// Token type fixed by external registration
pub const EXTERNAL_REG_TOKEN_TYPE: &str = "externalRegAddToToken";

/// Format workflow states, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FormatState {
    /// Nothing sent yet
    Init,
    /// Card manager selected
    CardManagerSelected,
    /// CUID and MSN known
    IdentityRead,
    /// Existing applet probed and versions read
    AppletProbed,
    /// Token type known
    ProfileResolved,
    /// Authentication skipped for external registration
    ExternalRegBypass,
    /// Operator authenticated
    Authenticated,
    /// Profile, directory and applet policies passed
    PolicyChecked,
    /// Applet upgrade finished
    AppletUpgraded,
    /// Issuer info written
    IssuerInfoWritten,
    /// Final progress reported
    StatusReported,
    /// Workflow complete
    Done,
    /// Workflow failed
    #[display("Failed({_0})")]
    Failed(TpsStatus),
}

/// What one format attempt has learned so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// Operation being run
    pub op: OpType,
    /// Selected token type
    pub token_type: Option<String>,
    /// Card identity
    pub identity: Option<TokenIdentity>,
    /// Versions from the status reply
    pub status: AppletStatus,
    /// Whether probing selected an existing applet
    pub applet_selected: bool,
    /// Applet build id, absent when no applet answered
    pub build_id: Option<Buffer>,
    /// Rendered applet version
    pub applet_version: Option<String>,
    /// Whether external registration fixed the token type
    pub external_reg: bool,
    /// Authenticated operator
    pub user_id: Option<String>,
    /// Version installed by the upgrade
    pub upgraded_to: Option<String>,
}

impl Attempt {
    /// Fresh attempt, optionally with a pre-selected token type
    pub fn new(op: OpType, token_type: Option<String>) -> Self {
        Self {
            op,
            token_type,
            identity: None,
            status: AppletStatus::default(),
            applet_selected: false,
            build_id: None,
            applet_version: None,
            external_reg: false,
            user_id: None,
            upgraded_to: None,
        }
    }

    /// Token type, or the literal default
    pub fn token_type(&self) -> &str {
        self.token_type.as_deref().unwrap_or(DEFAULT_TOKEN_TYPE)
    }

    /// CUID as hex, empty before the identity is read
    pub fn cuid(&self) -> String {
        self.identity.as_ref().map(TokenIdentity::cuid_hex).unwrap_or_default()
    }

    /// MSN as hex, empty before the identity is read
    pub fn msn(&self) -> String {
        self.identity.as_ref().map(TokenIdentity::msn_hex).unwrap_or_default()
    }
}
