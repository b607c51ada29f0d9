//! Applet upgrade and other secure channel steps
//!
//! The upgrade replaces whatever applet the token carries with the configured
//! version, reporting LOAD progress inside the 10..90 window.

use std::fs;

use tps_apdu_core::{BeginOp, CardTransport, Message, Session, SessionTransport, TransportError};
use tps_apdu_globalplatform::{
    ChannelError, HandshakeParams, SecureChannel, SecurityLevel, SelectCommand, establish,
};
use tracing::{debug, info, warn};

use crate::{
    context::FormatContext,
    error::{Error, Result},
    state::Attempt,
    status::TpsStatus,
};

/// Progress window covered by LOAD blocks
pub const LOAD_PROGRESS_WINDOW: (u8, u8) = (10, 90);

/// Info text sent with per-block progress
pub const BLOCK_PROGRESS_INFO: &str = "PROGRESS_APPLET_BLOCK";

/// Send one progress update and wait for the client's answer
///
/// The answer is read but not inspected.
pub(crate) fn report_progress<S: Session + ?Sized>(
    session: &mut S,
    status: u8,
    info: &str,
) -> std::result::Result<(), TransportError> {
    session.write(Message::StatusUpdateRequest {
        status,
        info: info.to_string(),
    })?;
    let reply = session.read()?;
    debug!(status, reply = reply.name(), "Progress reported");
    Ok(())
}

/// Establish a secure channel for the attempt's token type and authenticate it
pub(crate) fn open_channel<T: CardTransport + ?Sized>(
    ctx: &FormatContext,
    transport: &mut T,
    attempt: &Attempt,
    level: SecurityLevel,
) -> Result<SecureChannel> {
    let settings = ctx.settings();
    let token_type = attempt.token_type();
    let connector = settings.tks_connector(token_type);
    let params = HandshakeParams {
        key_version: settings.key_version()?,
        key_index: settings.key_index()?,
        cuid: attempt.cuid(),
        token_type: token_type.to_string(),
        shared_secret: settings.shared_secret(&connector),
        server_keygen: settings.server_keygen(&connector)?,
    };
    let kds = ctx.key_service(&connector)?;
    let mut channel = establish(transport, kds, ctx.keystore.as_ref(), &params)?;
    channel.external_authenticate(transport, level)?;
    Ok(channel)
}

fn upgrade_failure(error: ChannelError) -> Error {
    if error.is_transport() {
        Error::Channel(error)
    } else {
        Error::protocol(TpsStatus::UpgradeApplet, error.to_string())
    }
}

fn select_or_fail<T: CardTransport + ?Sized>(
    transport: &mut T,
    aid: &[u8],
    what: &str,
) -> Result<()> {
    let response = transport.send(&SelectCommand::with_aid(aid))?;
    if !response.is_success() {
        return Err(Error::protocol(
            TpsStatus::UpgradeApplet,
            format!("cannot select {what}: {}", response.status()),
        ));
    }
    Ok(())
}

/// Install `version` of the applet, replacing any existing one
pub(crate) fn upgrade_applet<S: Session>(
    ctx: &FormatContext,
    link: &mut SessionTransport<S>,
    begin: &BeginOp,
    attempt: &Attempt,
    version: &str,
) -> Result<()> {
    let settings = ctx.settings();
    let token_type = attempt.token_type();

    let path = settings
        .applet_path(token_type, version)
        .map_err(|e| Error::protocol(TpsStatus::UpgradeApplet, e.to_string()))?;
    let package = fs::read(&path).map_err(|source| Error::AppletFile {
        path: path.clone(),
        source,
    })?;
    info!(version, path = %path.display(), size = package.len(), "Upgrading applet");

    let card_manager = settings.card_manager_aid()?;
    let package_aid = settings.netkey_file_aid()?;
    let applet_aid = settings.netkey_instance_aid()?;
    let block_size = settings.block_size()?;
    let instance_size = settings.instance_size()?;
    let memory_size = settings.applet_memory_size()?;

    select_or_fail(link, &card_manager, "card manager")?;
    let mut channel = open_channel(ctx, link, attempt, SecurityLevel::MacEnc)?;

    for aid in [&applet_aid, &package_aid] {
        match channel.delete_file(link, aid) {
            Err(ChannelError::CardStatus { status, .. }) if status.is_not_found() => {
                debug!(aid = %aid, "Nothing to delete");
            }
            Err(ChannelError::CardStatus { status, .. }) => {
                warn!(aid = %aid, %status, "DELETE refused, continuing");
            }
            other => other.map_err(upgrade_failure)?,
        }
    }

    channel
        .install_load(link, &package_aid, &[], package.len())
        .map_err(upgrade_failure)?;

    let wants_progress = begin.wants_status_update();
    let on_progress = |link: &mut SessionTransport<S>, percent: u8| -> Result<(), ChannelError> {
        if wants_progress {
            report_progress(link.session_mut(), percent, BLOCK_PROGRESS_INFO)?;
        }
        Ok(())
    };
    channel
        .load_file(link, &package, block_size, LOAD_PROGRESS_WINDOW, on_progress)
        .map_err(upgrade_failure)?;

    channel
        .install_applet(link, &package_aid, &applet_aid, 0, instance_size, memory_size)
        .map_err(upgrade_failure)?;

    select_or_fail(link, &applet_aid, "upgraded applet").inspect_err(|_| {
        warn!(version, "Upgraded applet is not selectable");
    })?;
    info!(version, "Applet upgraded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tps_apdu_core::{OpType, session::MockSession};

    #[test]
    fn test_report_progress_accepts_any_reply() {
        let mut session = MockSession::new([Message::StatusUpdateResponse { status: 7 }]);
        report_progress(&mut session, 42, BLOCK_PROGRESS_INFO).unwrap();
        assert_eq!(
            session.sent,
            vec![Message::StatusUpdateRequest {
                status: 42,
                info: BLOCK_PROGRESS_INFO.into()
            }]
        );

        let mut session = MockSession::new([Message::LoginRequest {
            invalid_pw: 0,
            blocked: 0,
        }]);
        assert!(report_progress(&mut session, 100, "done").is_ok());
        assert!(report_progress(&mut session, 100, "done").is_err());
    }

    #[test]
    fn test_missing_applet_file() {
        let ctx = FormatContext::new(
            tps_policy::ConfigStore::new()
                .with("op.format.tokenType.update.applet.directory", "/nonexistent/applets"),
        );
        let mut session = MockSession::default();
        let mut link = SessionTransport::new(&mut session);
        let attempt = Attempt::new(OpType::Format, None);

        let err = upgrade_applet(&ctx, &mut link, &BeginOp::new(OpType::Format), &attempt, "1.4.0")
            .unwrap_err();
        assert!(matches!(err, Error::AppletFile { .. }));
        assert_eq!(err.status(), TpsStatus::UpgradeApplet);
        assert!(session.sent.is_empty());
    }

    #[test]
    fn test_missing_applet_directory() {
        let ctx = FormatContext::new(tps_policy::ConfigStore::new());
        let mut session = MockSession::default();
        let mut link = SessionTransport::new(&mut session);
        let attempt = Attempt::new(OpType::Format, None);

        let err = upgrade_applet(&ctx, &mut link, &BeginOp::new(OpType::Format), &attempt, "1.4.0")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol {
                status: TpsStatus::UpgradeApplet,
                ..
            }
        ));
        assert_eq!(err.status(), TpsStatus::UpgradeApplet);
        assert!(session.sent.is_empty());
    }
}
