//! Format workflow state machine
//!
//! One [`FormatProcessor`] serves one begin-operation on one card session. The
//! steps run in a fixed order; each takes the [`Attempt`] built so far and
//! returns it enriched:
//!
//! ```text
//! Init → CardManagerSelected → IdentityRead → AppletProbed → ProfileResolved
//!      → ExternalRegBypass | Authenticated → PolicyChecked → AppletUpgraded
//!      → IssuerInfoWritten → StatusReported → Done
//! ```
//!
//! Optional steps are recorded in the trail only when they run. Any error ends
//! the attempt in `Failed(status)`; nothing written to the card is rolled back.

use tps_apdu_core::{
    BeginOp, CardTransport, Message, Session, SessionTransport,
    session::{TOKEN_ATR_EXTENSION, TOKEN_TYPE_EXTENSION},
};
use tps_apdu_globalplatform::{
    AppletStatus, CoolKeyCommand, GetDataCommand, SecurityLevel, SelectCommand,
    constants::layout,
};
use tps_policy::{NO_RESOLVER, ResolverParams, auth};
use tracing::{debug, error, info, warn};

use crate::{
    context::FormatContext,
    error::{Denial, Error, Failure, Result},
    identity::{CPLC_BLOCK_LEN, TokenIdentity},
    state::{Attempt, EXTERNAL_REG_TOKEN_TYPE, FormatState},
    status::TpsStatus,
    upgrade::{open_channel, report_progress, upgrade_applet},
};

/// Info text of the final progress update
pub const DONE_INFO: &str = "done";

/// Outcome of a successful format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatReport {
    /// Card unique id, hex
    pub cuid: String,
    /// Manufacturer serial number, hex
    pub msn: String,
    /// Token type the policy was taken from
    pub token_type: String,
    /// Authenticated operator
    pub user_id: Option<String>,
    /// Applet version found on the card
    pub applet_version: Option<String>,
    /// Applet version installed
    pub upgraded_to: Option<String>,
    /// States visited
    pub trail: Vec<FormatState>,
}

/// Runs the format workflow over one session
#[derive(Debug)]
pub struct FormatProcessor<'ctx, S: Session> {
    ctx: &'ctx FormatContext,
    link: SessionTransport<S>,
    begin: BeginOp,
    token_type: Option<String>,
    trail: Vec<FormatState>,
}

impl<'ctx, S: Session> FormatProcessor<'ctx, S> {
    /// Create a processor for a begin-operation received on `session`
    pub fn new(ctx: &'ctx FormatContext, session: S, begin: BeginOp) -> Self {
        Self {
            ctx,
            link: SessionTransport::new(session),
            begin,
            token_type: None,
            trail: vec![FormatState::Init],
        }
    }

    /// Pre-select the token type, skipping profile resolution
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    /// States visited so far
    pub fn trail(&self) -> &[FormatState] {
        &self.trail
    }

    /// Give the session back
    pub fn into_session(self) -> S {
        self.link.into_inner()
    }

    /// Run the workflow and report the outcome to the client
    pub fn process(&mut self) -> std::result::Result<FormatReport, Failure> {
        let attempt = Attempt::new(self.begin.op, self.token_type.clone());
        match self.run(attempt) {
            Ok(attempt) => {
                if let Err(e) = self.end_op(TpsStatus::Success) {
                    warn!(error = %e, "Could not send end of operation");
                }
                Ok(FormatReport {
                    cuid: attempt.cuid(),
                    msn: attempt.msn(),
                    token_type: attempt.token_type().to_string(),
                    user_id: attempt.user_id,
                    applet_version: attempt.applet_version,
                    upgraded_to: attempt.upgraded_to,
                    trail: self.trail.clone(),
                })
            }
            Err(e) => {
                let state = self.state();
                let status = e.status();
                error!(error = %e, %state, status = status.code(), "Format failed");
                self.trail.push(FormatState::Failed(status));
                if let Err(e) = self.end_op(status) {
                    warn!(error = %e, "Could not send end of operation");
                }
                Err(Failure { status, state })
            }
        }
    }

    /// Send the end-of-operation message
    pub fn end_op(
        &mut self,
        status: TpsStatus,
    ) -> std::result::Result<(), tps_apdu_core::TransportError> {
        self.link.session_mut().write(Message::EndOp {
            op: self.begin.op,
            result: u8::from(status != TpsStatus::Success),
            message: status.code(),
        })
    }

    fn state(&self) -> FormatState {
        self.trail.last().copied().unwrap_or(FormatState::Init)
    }

    fn enter(&mut self, state: FormatState) {
        debug!(from = %self.state(), to = %state, "Format transition");
        self.trail.push(state);
    }

    fn run(&mut self, attempt: Attempt) -> Result<Attempt> {
        self.select_card_manager()?;
        self.enter(FormatState::CardManagerSelected);

        let attempt = self.read_identity(attempt)?;
        self.enter(FormatState::IdentityRead);

        let attempt = self.probe_applet(attempt)?;
        self.enter(FormatState::AppletProbed);

        let attempt = self.resolve_profile(attempt)?;
        self.enter(FormatState::ProfileResolved);

        let attempt = if attempt.external_reg {
            self.enter(FormatState::ExternalRegBypass);
            attempt
        } else {
            let attempt = self.authenticate(attempt)?;
            self.enter(FormatState::Authenticated);
            attempt
        };

        let attempt = self.check_policy(attempt)?;
        self.enter(FormatState::PolicyChecked);

        let attempt = self.upgrade(attempt)?;
        let attempt = self.write_issuer_info(attempt)?;
        self.report_done()?;

        self.enter(FormatState::Done);
        info!(cuid = %attempt.cuid(), token_type = attempt.token_type(), "Format complete");
        Ok(attempt)
    }

    fn select_card_manager(&mut self) -> Result<()> {
        let aid = self.ctx.settings().card_manager_aid()?;
        let response = self.link.send(&SelectCommand::with_aid(&aid))?;
        if !response.is_success() {
            return Err(Error::protocol(
                TpsStatus::SecureChannel,
                format!("card manager select failed with {}", response.status()),
            ));
        }
        Ok(())
    }

    fn read_identity(&mut self, mut attempt: Attempt) -> Result<Attempt> {
        let response = self.link.send(&GetDataCommand::cplc())?;
        if !response.is_success() {
            return Err(Error::protocol(
                TpsStatus::SecureChannel,
                format!("CPLC read failed with {}", response.status()),
            ));
        }
        // The identity offsets count the status word as part of the block
        let block = response.to_bytes();
        if block.len() != CPLC_BLOCK_LEN {
            return Err(Error::protocol(
                TpsStatus::SecureChannel,
                format!("CPLC block is {} bytes, expected {CPLC_BLOCK_LEN}", block.len()),
            ));
        }
        let identity = TokenIdentity::from_cplc(&block)?;
        debug!(cuid = %identity.cuid_hex(), msn = %identity.msn_hex(), "Token identity read");
        attempt.identity = Some(identity);
        Ok(attempt)
    }

    fn probe_applet(&mut self, mut attempt: Attempt) -> Result<Attempt> {
        let aid = self.ctx.settings().netkey_instance_aid()?;
        let select = self.link.send(&SelectCommand::with_aid(&aid))?;
        attempt.applet_selected = select.is_success();
        debug!(selected = attempt.applet_selected, status = %select.status(), "Probed applet");

        let status = self.link.send(&CoolKeyCommand::get_status())?;
        attempt.status = AppletStatus::from_reply(&status.to_bytes());
        debug!(status = ?attempt.status, "Token status read");
        Ok(attempt)
    }

    fn resolve_profile(&mut self, mut attempt: Attempt) -> Result<Attempt> {
        let settings = self.ctx.settings();
        if settings.external_reg_enabled()? {
            attempt.external_reg = true;
            attempt.token_type = Some(EXTERNAL_REG_TOKEN_TYPE.to_string());
            return Ok(attempt);
        }

        let resolver = settings.resolver_name();
        if resolver != NO_RESOLVER && attempt.token_type.is_none() {
            let params = ResolverParams {
                op: attempt.op.to_string(),
                cuid: attempt.cuid(),
                msn: attempt.msn(),
                major_version: attempt.status.applet_major,
                minor_version: attempt.status.applet_minor,
                ext_token_type: self.begin.extension(TOKEN_TYPE_EXTENSION).map(str::to_string),
                ext_token_atr: self.begin.extension(TOKEN_ATR_EXTENSION).map(str::to_string),
            };
            let token_type = self.ctx.resolvers.resolve(&resolver, &params)?;
            debug!(resolver, token_type, "Token type resolved");
            attempt.token_type = Some(token_type);
        }
        Ok(attempt)
    }

    fn authenticate(&mut self, mut attempt: Attempt) -> Result<Attempt> {
        let settings = self.ctx.settings();
        let token_type = attempt.token_type().to_string();
        if !settings.auth_enabled(&token_type)? {
            debug!(token_type, "Authentication disabled");
            return Ok(attempt);
        }

        // Every failure from here on is a login failure
        let token = settings
            .auth_id(&token_type)
            .map_err(tps_policy::AuthError::from)
            .and_then(|id| self.ctx.authenticators.get(id))
            .and_then(|authenticator| {
                auth::authenticate(self.link.session_mut(), &self.begin, authenticator)
            })?;
        attempt.user_id = token.user_id().map(str::to_string);
        Ok(attempt)
    }

    fn check_policy(&mut self, mut attempt: Attempt) -> Result<Attempt> {
        let settings = self.ctx.settings();
        let token_type = attempt.token_type().to_string();

        if !settings.profile_enabled(&token_type) {
            return Err(Error::PolicyDenied(Denial::ProfileDisabled(token_type)));
        }

        let cuid = attempt.cuid();
        if !self.ctx.directory.contains(&cuid) && !settings.allow_unknown_token()? {
            return Err(Error::PolicyDenied(Denial::UnknownToken));
        }

        attempt = self.read_applet_version(attempt)?;
        if attempt.build_id.is_none() && !settings.allow_no_applet(&token_type)? {
            return Err(Error::PolicyDenied(Denial::NoAppletToken));
        }
        Ok(attempt)
    }

    fn read_applet_version(&mut self, mut attempt: Attempt) -> Result<Attempt> {
        let response = self.link.send(&CoolKeyCommand::get_version())?;
        if !response.is_success() {
            debug!(status = %response.status(), "No applet on token");
            return Ok(attempt);
        }
        let raw = response.to_bytes();
        if raw.len() != layout::APPLET_VERSION_LEN {
            return Err(Error::protocol(
                TpsStatus::SecureChannel,
                format!("applet version reply is {} bytes", raw.len()),
            ));
        }
        let build_id = tps_apdu_core::Buffer::from(&raw[..layout::BUILD_ID_LEN]);
        let version = format!(
            "{:x}.{:x}.{}",
            attempt.status.applet_major,
            attempt.status.applet_minor,
            build_id.to_hex()
        );
        debug!(version, "Applet version read");
        attempt.build_id = Some(build_id);
        attempt.applet_version = Some(version);
        Ok(attempt)
    }

    fn upgrade(&mut self, mut attempt: Attempt) -> Result<Attempt> {
        let settings = self.ctx.settings();
        let Some(version) = settings.required_version(attempt.token_type()) else {
            return Err(Error::protocol(
                TpsStatus::UpgradeApplet,
                format!("no required applet version for token type {}", attempt.token_type()),
            ));
        };
        if attempt.applet_version.as_deref() == Some(version) {
            debug!(version, "Reinstalling current applet version");
        }
        upgrade_applet(self.ctx, &mut self.link, &self.begin, &attempt, version)?;
        attempt.upgraded_to = Some(version.to_string());
        self.enter(FormatState::AppletUpgraded);
        Ok(attempt)
    }

    fn write_issuer_info(&mut self, attempt: Attempt) -> Result<Attempt> {
        let settings = self.ctx.settings();
        let token_type = attempt.token_type();
        if !settings.issuer_info_enabled(token_type)? {
            return Ok(attempt);
        }
        let issuer = settings.issuer_info_value(token_type)?;

        let mut channel = open_channel(self.ctx, &mut self.link, &attempt, SecurityLevel::MacEnc)?;
        channel.set_issuer_info(&mut self.link, issuer.as_bytes())?;
        info!(issuer, "Issuer info written");
        self.enter(FormatState::IssuerInfoWritten);
        Ok(attempt)
    }

    fn report_done(&mut self) -> Result<()> {
        if self.begin.wants_status_update() {
            report_progress(self.link.session_mut(), 100, DONE_INFO)?;
            self.enter(FormatState::StatusReported);
        }
        Ok(())
    }
}
