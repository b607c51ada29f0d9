//! Secure channel establishment through the key-derivation service
//!
//! The handshake runs in a fixed order:
//!
//! 1. obtain an 8-byte host challenge from the service
//! 2. send INITIALIZE UPDATE and validate the 28-byte answer
//! 3. split the answer into diversification data, key info, card challenge and
//!    card cryptogram
//! 4. have the service compute the wrapped session keys and host cryptogram
//! 5. unwrap both keys with the shared secret
//!
//! The returned channel is not authenticated yet.

use tps_apdu_core::CardTransport;
use tracing::{debug, info, warn};

use crate::{
    ChannelError, Result,
    commands::{InitializeUpdateCommand, InitializeUpdateOk},
    constants::layout,
    kds::{KeyDerivationService, SessionKeyRequest},
    keys::{KeyStore, SharedSecretRef},
    secure_channel::SecureChannel,
};

/// Inputs of a secure channel handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeParams {
    /// Key version for INITIALIZE UPDATE P1
    pub key_version: u8,
    /// Key index for INITIALIZE UPDATE P2
    pub key_index: u8,
    /// Card identifier passed to the service
    pub cuid: String,
    /// Token type passed to the service
    pub token_type: String,
    /// Shared secret unwrapping the session keys
    pub shared_secret: SharedSecretRef,
    /// Whether keys are generated server-side for this connector
    pub server_keygen: bool,
}

/// Run the handshake and return an unauthenticated channel
pub fn establish<T: CardTransport + ?Sized>(
    transport: &mut T,
    kds: &dyn KeyDerivationService,
    keystore: &dyn KeyStore,
    params: &HandshakeParams,
) -> Result<SecureChannel> {
    let random = kds
        .compute_random_data(layout::HOST_CHALLENGE_LEN)
        .map_err(|e| ChannelError::KeyDerivation(e.to_string()))?;
    if random.status != 0 || random.data.len() != layout::HOST_CHALLENGE_LEN {
        return Err(ChannelError::KeyDerivation(format!(
            "host challenge request failed (status {}, {} bytes)",
            random.status,
            random.data.len()
        )));
    }
    let host_challenge = random.data;

    let command = InitializeUpdateCommand::with_challenge(
        params.key_version,
        params.key_index,
        &host_challenge,
    );
    let response = transport.send(&command)?;
    let card = InitializeUpdateOk::from_response(&response)?;
    debug!(key_info = %card.key_info, "INITIALIZE UPDATE accepted");

    let request = SessionKeyRequest {
        cuid: params.cuid.clone(),
        token_type: params.token_type.clone(),
        diversification_data: card.diversification_data.clone(),
        key_info: card.key_info.clone(),
        card_challenge: card.card_challenge.clone(),
        host_challenge: host_challenge.clone(),
        card_cryptogram: card.card_cryptogram.clone(),
    };
    let keys = kds
        .compute_session_key(&request)
        .map_err(|e| ChannelError::KeyDerivation(e.to_string()))?;
    if keys.status != 0 {
        return Err(ChannelError::KeyDerivation(format!(
            "session key computation failed with status {}",
            keys.status
        )));
    }
    if keys.host_cryptogram.is_empty() {
        return Err(ChannelError::KeyDerivation("no host cryptogram returned".into()));
    }

    if params.server_keygen {
        // Key transport for server-side generation is not provided yet
        info!(cuid = %params.cuid, "Server-side key generation requested");
    }

    let secret = &params.shared_secret;
    if !keystore.key_names(&secret.token).iter().any(|name| *name == secret.name) {
        warn!(secret = %secret, "Shared secret not found");
        return Err(ChannelError::KeyUnwrap(format!("shared secret {secret} not found")));
    }
    let session_key = keystore.unwrap_key(secret, &keys.wrapped_session_key)?;
    let enc_key = keystore.unwrap_key(secret, &keys.wrapped_enc_key)?;

    debug!(cuid = %params.cuid, "Secure channel established");
    Ok(SecureChannel::new(
        session_key,
        enc_key,
        card,
        host_challenge,
        keys.host_cryptogram,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        SecurityLevel,
        kds::mock::FakeKeyService,
        keys::{INTERNAL_KEY_STORAGE_TOKEN, SoftKeyStore, SymmetricKey},
    };
    use hex_literal::hex;
    use tps_apdu_core::{Response, SessionTransport, session::MockSession};

    const INIT_UPDATE: [u8; 30] =
        hex!("000002650183039536622002000de9c62ba1c4c8e55fcb91b6654ce49000");

    fn params() -> HandshakeParams {
        HandshakeParams {
            key_version: 0,
            key_index: 0,
            cuid: "40906145C76224192D11".into(),
            token_type: "tokenKey".into(),
            shared_secret: SharedSecretRef::default(),
            server_keygen: false,
        }
    }

    fn keystore(kds: &FakeKeyService) -> SoftKeyStore {
        SoftKeyStore::new().with_key(
            INTERNAL_KEY_STORAGE_TOKEN,
            "sharedSecret",
            SymmetricKey::new(kds.shared_secret),
        )
    }

    #[test]
    fn test_establish() {
        let kds = FakeKeyService::default();
        let mut session = MockSession::default();
        session.push_card(Response::from_bytes(&INIT_UPDATE).unwrap()).push_ok();
        let mut transport = SessionTransport::new(&mut session);

        let mut channel = establish(&mut transport, &kds, &keystore(&kds), &params()).unwrap();
        assert!(!channel.is_authenticated());
        assert_eq!(channel.host_cryptogram().as_ref(), [0x22; 8]);
        assert_eq!(channel.card().card_challenge.as_ref(), hex!("000de9c62ba1c4c8"));

        channel.external_authenticate(&mut transport, SecurityLevel::MacEnc).unwrap();
        assert!(channel.is_authenticated());

        let sent = session.sent_apdus();
        assert_eq!(sent[0].as_ref(), hex!("8050000008111111111111111100"));
        let requests = kds.requests.lock().unwrap();
        assert_eq!(requests[0].host_challenge.as_ref(), [0x11; 8]);
        assert_eq!(requests[0].key_info.as_ref(), hex!("2002"));
    }

    #[test]
    fn test_establish_is_deterministic() {
        let kds = FakeKeyService::default();
        let store = keystore(&kds);
        let run = || {
            let mut session = MockSession::default();
            session.push_card(Response::from_bytes(&INIT_UPDATE).unwrap()).push_ok();
            let mut transport = SessionTransport::new(&mut session);
            let mut channel = establish(&mut transport, &kds, &store, &params()).unwrap();
            channel.external_authenticate(&mut transport, SecurityLevel::Mac).unwrap();
            session.sent_apdus()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_wrong_init_update_size_touches_no_keys() {
        let kds = FakeKeyService::default();
        let mut session = MockSession::default();
        session.push_card(Response::success(hex!("0000026501830395366220").to_vec()));
        let mut transport = SessionTransport::new(&mut session);

        let result = establish(&mut transport, &kds, &keystore(&kds), &params());
        assert!(matches!(result, Err(ChannelError::Protocol(_))));
        assert_eq!(kds.session_key_calls(), 0);
    }

    #[test]
    fn test_missing_shared_secret() {
        let kds = FakeKeyService::default();
        let mut session = MockSession::default();
        session.push_card(Response::from_bytes(&INIT_UPDATE).unwrap());
        let mut transport = SessionTransport::new(&mut session);

        let mut params = params();
        params.shared_secret = SharedSecretRef::new(INTERNAL_KEY_STORAGE_TOKEN, "otherSecret");
        let result = establish(&mut transport, &kds, &keystore(&kds), &params);
        assert!(matches!(result, Err(ChannelError::KeyUnwrap(_))));
    }

    #[test]
    fn test_service_failures() {
        let kds = FakeKeyService {
            status: 1,
            ..FakeKeyService::default()
        };
        let mut session = MockSession::default();
        let mut transport = SessionTransport::new(&mut session);
        let result = establish(&mut transport, &kds, &keystore(&kds), &params());
        assert!(matches!(result, Err(ChannelError::KeyDerivation(_))));
        assert!(session.sent.is_empty());
    }

    #[test]
    fn test_failed_init_update_status() {
        let kds = FakeKeyService::default();
        let mut session = MockSession::default();
        session.push_card(Response::error((0x6A, 0x88)));
        let mut transport = SessionTransport::new(&mut session);
        let result = establish(&mut transport, &kds, &keystore(&kds), &params());
        assert!(matches!(result, Err(ChannelError::CardStatus { .. })));
    }
}
