//! SCP02 secure channel
//!
//! A [`SecureChannel`] is produced by [`handshake::establish`](crate::handshake::establish)
//! in the unauthenticated state. [`SecureChannel::external_authenticate`]
//! raises it to the requested security level; every card management
//! operation refuses to send anything until then.

use std::fmt;

use bytes::{BufMut, BytesMut};
use cipher::Iv;
use tps_apdu_core::{Buffer, CardTransport, Command, Response, command::MAX_DATA_LEN};
use tracing::{debug, trace, warn};
use zeroize::Zeroize;

use crate::{
    ChannelError, Result,
    commands::{
        CoolKeyCommand, DeleteCommand, ExternalAuthenticateCommand, InitializeUpdateOk,
        InstallCommand, LoadCommand,
    },
    constants::SecurityLevel,
    crypto::{Scp02, encrypt_data, encrypt_icv, mac_full_3des},
    keys::SymmetricKey,
    load::{LoadFile, progress},
};

/// Secure messaging bit of the class byte
const CLA_SECURE_MESSAGING: u8 = 0x04;

/// Length of the C-MAC appended to protected commands
const MAC_LEN: usize = 8;

/// Session state of one secure channel
pub struct SecureChannel {
    session_key: SymmetricKey,
    enc_key: SymmetricKey,
    card: InitializeUpdateOk,
    host_challenge: Buffer,
    host_cryptogram: Buffer,
    /// MAC of the previous command
    icv: Iv<Scp02>,
    security_level: SecurityLevel,
    authenticated: bool,
}

impl fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureChannel")
            .field("key_info", &self.card.key_info)
            .field("security_level", &self.security_level)
            .field("authenticated", &self.authenticated)
            .finish_non_exhaustive()
    }
}

impl Drop for SecureChannel {
    fn drop(&mut self) {
        self.icv.as_mut_slice().zeroize();
    }
}

impl SecureChannel {
    /// Create an unauthenticated channel from handshake results
    pub fn new(
        session_key: SymmetricKey,
        enc_key: SymmetricKey,
        card: InitializeUpdateOk,
        host_challenge: Buffer,
        host_cryptogram: Buffer,
    ) -> Self {
        Self {
            session_key,
            enc_key,
            card,
            host_challenge,
            host_cryptogram,
            icv: Iv::<Scp02>::default(),
            security_level: SecurityLevel::default(),
            authenticated: false,
        }
    }

    /// Whether EXTERNAL AUTHENTICATE succeeded
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Current security level
    pub const fn security_level(&self) -> SecurityLevel {
        self.security_level
    }

    /// Card data returned by INITIALIZE UPDATE
    pub const fn card(&self) -> &InitializeUpdateOk {
        &self.card
    }

    /// Host challenge sent in INITIALIZE UPDATE
    pub const fn host_challenge(&self) -> &Buffer {
        &self.host_challenge
    }

    /// Host cryptogram computed by the key service
    pub const fn host_cryptogram(&self) -> &Buffer {
        &self.host_cryptogram
    }

    /// Largest plain data field that still fits a short APDU once wrapped
    pub const fn max_plain_len(&self) -> usize {
        let room = MAX_DATA_LEN - MAC_LEN;
        if self.security_level.encrypts() {
            // Padding always adds at least one byte
            room / 8 * 8 - 1
        } else {
            room
        }
    }

    /// Wrap a command with a C-MAC, encrypting its data once the channel is
    /// authenticated at [`SecurityLevel::MacEnc`]
    pub fn wrap_command(&mut self, command: &Command) -> Command {
        let cla = command.cla | CLA_SECURE_MESSAGING;
        let data = command.data();

        let mut mac_data = BytesMut::with_capacity(5 + data.len());
        mac_data.put_u8(cla);
        mac_data.put_u8(command.ins);
        mac_data.put_u8(command.p1);
        mac_data.put_u8(command.p2);
        mac_data.put_u8((data.len() + MAC_LEN) as u8);
        mac_data.put_slice(data);

        // A zero chaining value is used as-is
        let icv = if self.icv == Iv::<Scp02>::default() {
            self.icv
        } else {
            encrypt_icv(self.session_key.as_key(), &self.icv)
        };
        let mac = mac_full_3des(self.session_key.as_key(), &icv, &mac_data);
        self.icv.copy_from_slice(&mac);

        let body = if self.authenticated && self.security_level.encrypts() && !data.is_empty() {
            encrypt_data(self.enc_key.as_key(), data)
        } else {
            data.to_vec()
        };

        let mut new_data = BytesMut::with_capacity(body.len() + MAC_LEN);
        new_data.put_slice(&body);
        new_data.put_slice(&mac);

        let wrapped =
            Command::new(cla, command.ins, command.p1, command.p2).with_data(new_data.freeze());
        match command.le {
            Some(le) => wrapped.with_le(le),
            None => wrapped,
        }
    }

    /// Authenticate the channel with the host cryptogram
    pub fn external_authenticate<T: CardTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        level: SecurityLevel,
    ) -> Result<()> {
        let command =
            ExternalAuthenticateCommand::with_host_cryptogram(level, &self.host_cryptogram);
        let wrapped = self.wrap_command(&command);
        let response = transport.send(&wrapped)?;

        if let Err(e) = ChannelError::check("EXTERNAL AUTHENTICATE", &response) {
            self.authenticated = false;
            return Err(e);
        }

        self.security_level = level;
        self.authenticated = true;
        debug!(level = ?level, "Secure channel authenticated");
        Ok(())
    }

    /// Send a protected command and return the card's response
    pub fn send<T: CardTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        command: &Command,
    ) -> Result<Response> {
        if !self.authenticated {
            return Err(ChannelError::NotAuthenticated);
        }
        let wrapped = self.wrap_command(command);
        trace!(command = %command, wrapped = %wrapped, "Sending protected command");
        Ok(transport.send(&wrapped)?)
    }

    fn send_checked<T: CardTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        name: &'static str,
        command: &Command,
    ) -> Result<()> {
        let response = self.send(transport, command)?;
        ChannelError::check(name, &response)
    }

    /// Delete an applet instance or package
    ///
    /// A failed status is logged and returned; the object may simply not exist.
    pub fn delete_file<T: CardTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        aid: &[u8],
    ) -> Result<()> {
        if !self.authenticated {
            return Err(ChannelError::NotAuthenticated);
        }
        let command = DeleteCommand::delete_object(aid)?;
        let response = self.send(transport, &command)?;
        if !response.is_success() {
            warn!(aid = %hex::encode_upper(aid), status = %response.status(), "DELETE failed");
        }
        ChannelError::check("DELETE", &response)
    }

    /// INSTALL [for load] announcing a package of `file_len` bytes
    pub fn install_load<T: CardTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        package_aid: &[u8],
        security_domain_aid: &[u8],
        file_len: usize,
    ) -> Result<()> {
        let file_len = u16::try_from(file_len).map_err(|_| {
            ChannelError::Protocol(format!("load file of {file_len} bytes is too large"))
        })?;
        let command = InstallCommand::for_load(package_aid, security_domain_aid, file_len);
        self.send_checked(transport, "INSTALL [for load]", &command)
    }

    /// Stream a package in LOAD blocks
    ///
    /// After each block `progress` receives the transport and the percentage
    /// reached within `window`.
    pub fn load_file<T, F>(
        &mut self,
        transport: &mut T,
        package: &[u8],
        block_size: usize,
        window: (u8, u8),
        mut on_progress: F,
    ) -> Result<()>
    where
        T: CardTransport + ?Sized,
        F: FnMut(&mut T, u8) -> Result<()>,
    {
        if !self.authenticated {
            return Err(ChannelError::NotAuthenticated);
        }
        let block_size = block_size.min(self.max_plain_len());
        let file = LoadFile::new(package, block_size)?;
        let total = file.total_len();
        debug!(blocks = file.blocks_count(), total, block_size, "Loading package");

        for block in file.blocks() {
            let command = LoadCommand::with_block(block.last, block.number, block.data);
            self.send_checked(transport, "LOAD", &command)?;
            on_progress(&mut *transport, progress(window, block.end, total))?;
        }
        Ok(())
    }

    /// INSTALL [for install and make selectable]
    pub fn install_applet<T: CardTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        package_aid: &[u8],
        applet_aid: &[u8],
        privileges: u8,
        instance_size: u16,
        memory_size: u16,
    ) -> Result<()> {
        let command = InstallCommand::for_install_and_make_selectable(
            package_aid,
            applet_aid,
            privileges,
            instance_size,
            memory_size,
        );
        self.send_checked(transport, "INSTALL [for install]", &command)
    }

    /// Write issuer information to the applet
    pub fn set_issuer_info<T: CardTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        info: &[u8],
    ) -> Result<()> {
        // The builder already carries the MAC class; wrapping sets the same bit
        let command = CoolKeyCommand::set_issuer_info(info);
        self.send_checked(transport, "SET ISSUER INFO", &command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use tps_apdu_core::{SessionTransport, session::MockSession};

    fn channel(session_key: [u8; 16], host_cryptogram: [u8; 8]) -> SecureChannel {
        let card = InitializeUpdateOk::from_response(
            &Response::from_bytes(&hex!(
                "000002650183039536622002000de9c62ba1c4c8e55fcb91b6654ce49000"
            ))
            .unwrap(),
        )
        .unwrap();
        SecureChannel::new(
            SymmetricKey::new(session_key),
            SymmetricKey::new(hex!("404142434445464748494a4b4c4d4e4f")),
            card,
            Buffer::from(hex!("f0467f908e5ca23f").to_vec()),
            Buffer::from(host_cryptogram.to_vec()),
        )
    }

    #[test]
    fn test_external_authenticate_and_chaining() {
        let mut session = MockSession::default();
        session.push_ok().push_ok();
        let mut transport = SessionTransport::new(&mut session);

        let mut channel =
            channel(hex!("2983ba77d709c2daa1e6000abccac951"), hex!("1d4de92eaf7a2c9f"));
        channel.external_authenticate(&mut transport, SecurityLevel::Mac).unwrap();
        assert!(channel.is_authenticated());

        let command =
            Command::new_with_data(0x80, 0xF2, 0x80, 0x02, hex!("4f00").to_vec()).with_le(0);
        channel.send(&mut transport, &command).unwrap();

        let sent = session.sent_apdus();
        assert_eq!(sent[0].as_ref(), hex!("84820100101d4de92eaf7a2c9f8f9b0df681c1d3ec"));
        assert_eq!(sent[1].as_ref(), hex!("84f280020a4f0030f149209e17b39700"));
    }

    #[test]
    fn test_failed_authentication() {
        let mut session = MockSession::default();
        session.push_card(Response::error((0x63, 0x00)));
        let mut transport = SessionTransport::new(&mut session);

        let mut channel = channel([0x40; 16], [0x22; 8]);
        assert!(matches!(
            channel.external_authenticate(&mut transport, SecurityLevel::MacEnc),
            Err(ChannelError::CardStatus { .. })
        ));
        assert!(!channel.is_authenticated());
    }

    #[test]
    fn test_operations_require_authentication() {
        let mut session = MockSession::default();
        let mut transport = SessionTransport::new(&mut session);
        let mut channel = channel([0x40; 16], [0x22; 8]);

        let aid = hex!("627601FF000000");
        assert!(matches!(
            channel.delete_file(&mut transport, &aid),
            Err(ChannelError::NotAuthenticated)
        ));
        assert!(matches!(
            channel.install_load(&mut transport, &aid, &[], 10),
            Err(ChannelError::NotAuthenticated)
        ));
        assert!(matches!(
            channel.load_file(&mut transport, &[0; 10], 242, (10, 90), |_, _| Ok(())),
            Err(ChannelError::NotAuthenticated)
        ));
        assert!(matches!(
            channel.install_applet(&mut transport, &aid, &aid, 0, 18000, 5000),
            Err(ChannelError::NotAuthenticated)
        ));
        assert!(matches!(
            channel.set_issuer_info(&mut transport, b"issuer"),
            Err(ChannelError::NotAuthenticated)
        ));
        assert!(session.sent.is_empty());
    }

    #[test]
    fn test_mac_enc_encrypts_data() {
        let mut session = MockSession::default();
        session.push_ok().push_ok();
        let mut transport = SessionTransport::new(&mut session);

        let mut channel = channel([0x40; 16], [0x22; 8]);
        channel.external_authenticate(&mut transport, SecurityLevel::MacEnc).unwrap();
        channel.set_issuer_info(&mut transport, b"abc").unwrap();

        let sent = session.sent_apdus();
        // EXTERNAL AUTHENTICATE itself is never encrypted
        assert_eq!(&sent[0][..5], hex!("8482030010"));
        assert_eq!(&sent[0][5..13], [0x22; 8]);
        // 3 bytes pad to one block, plus the MAC
        assert_eq!(&sent[1][..5], hex!("84F4000010"));
        assert_ne!(&sent[1][5..8], *b"abc");
    }

    #[test]
    fn test_load_file_reports_progress() {
        let mut session = MockSession::default();
        session.push_ok().push_ok().push_ok();
        let mut transport = SessionTransport::new(&mut session);

        let mut channel = channel([0x40; 16], [0x22; 8]);
        channel.external_authenticate(&mut transport, SecurityLevel::Mac).unwrap();

        let mut seen = Vec::new();
        channel
            .load_file(&mut transport, &[0xAB; 300], 242, (10, 90), |_, percent| {
                seen.push(percent);
                Ok(())
            })
            .unwrap();

        assert_eq!(seen.last(), Some(&90));
        assert_eq!(seen.len(), 2);
        let sent = session.sent_apdus();
        assert_eq!(&sent[1][..4], hex!("84E80000"));
        assert_eq!(&sent[2][..4], hex!("84E88001"));
    }

    #[test]
    fn test_load_blocks_fit_when_encrypted() {
        let mut session = MockSession::default();
        session.push_ok().push_ok().push_ok();
        let mut transport = SessionTransport::new(&mut session);

        let mut channel = channel([0x40; 16], [0x22; 8]);
        assert_eq!(channel.max_plain_len(), 247);
        channel.external_authenticate(&mut transport, SecurityLevel::MacEnc).unwrap();
        assert_eq!(channel.max_plain_len(), 239);

        channel
            .load_file(&mut transport, &[0xAB; 300], 242, (10, 90), |_, _| Ok(()))
            .unwrap();
        let sent = session.sent_apdus();
        assert_eq!(sent.len(), 3);
        // 239 plain bytes pad to 240, plus the MAC
        assert_eq!(sent[1][4], 248);
    }

    #[test]
    fn test_delete_failure_is_reported() {
        let mut session = MockSession::default();
        session.push_ok().push_card(Response::error((0x6A, 0x88)));
        let mut transport = SessionTransport::new(&mut session);

        let mut channel = channel([0x40; 16], [0x22; 8]);
        channel.external_authenticate(&mut transport, SecurityLevel::Mac).unwrap();
        let err = channel.delete_file(&mut transport, &hex!("627601FF0000")).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::CardStatus {
                command: "DELETE",
                ..
            }
        ));
    }
}
