//! Key-derivation service interface
//!
//! The service holds the card master keys. It issues host challenges and
//! computes session keys, which it returns wrapped under the shared secret.

use std::fmt;

use thiserror::Error;
use tps_apdu_core::Buffer;

/// Failure reaching the key-derivation service
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KdsError {
    /// No service is configured for the connector
    #[error("no key service configured for connector {0}")]
    UnknownConnector(String),

    /// The service could not be reached
    #[error("key service unavailable: {0}")]
    Unavailable(String),
}

/// Random data returned by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomData {
    /// Service status, zero on success
    pub status: i32,
    /// Random bytes
    pub data: Buffer,
}

/// Inputs of a session key computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeyRequest {
    /// Card identifier, upper-case hex
    pub cuid: String,
    /// Token type being processed
    pub token_type: String,
    /// Key diversification data from INITIALIZE UPDATE
    pub diversification_data: Buffer,
    /// Key information from INITIALIZE UPDATE
    pub key_info: Buffer,
    /// Card challenge
    pub card_challenge: Buffer,
    /// Host challenge
    pub host_challenge: Buffer,
    /// Card cryptogram
    pub card_cryptogram: Buffer,
}

/// Session key computation result
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKeyResponse {
    /// Service status, zero on success
    pub status: i32,
    /// Session MAC key wrapped under the shared secret
    pub wrapped_session_key: Buffer,
    /// Session encryption key wrapped under the shared secret
    pub wrapped_enc_key: Buffer,
    /// Host cryptogram for EXTERNAL AUTHENTICATE
    pub host_cryptogram: Buffer,
}

impl fmt::Debug for SessionKeyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeyResponse")
            .field("status", &self.status)
            .field("host_cryptogram", &self.host_cryptogram)
            .finish_non_exhaustive()
    }
}

/// Remote service computing secure channel session keys
pub trait KeyDerivationService: Send + Sync + fmt::Debug {
    /// Ask for `size` random bytes
    fn compute_random_data(&self, size: usize) -> Result<RandomData, KdsError>;

    /// Compute session keys for one channel
    fn compute_session_key(
        &self,
        request: &SessionKeyRequest,
    ) -> Result<SessionKeyResponse, KdsError>;
}

/// Deterministic in-process service for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use std::sync::Mutex;

    use cipher::Key;

    use super::*;
    use crate::crypto::{Scp02, ecb_encrypt};

    /// Service returning fixed keys wrapped under a known shared secret
    #[derive(Debug)]
    pub struct FakeKeyService {
        /// Host challenge handed out
        pub host_challenge: [u8; 8],
        /// Shared secret used to wrap keys
        pub shared_secret: [u8; 16],
        /// Session MAC key
        pub session_key: [u8; 16],
        /// Session encryption key
        pub enc_key: [u8; 16],
        /// Host cryptogram returned
        pub host_cryptogram: [u8; 8],
        /// Status returned by both calls
        pub status: i32,
        /// Requests received
        pub requests: Mutex<Vec<SessionKeyRequest>>,
    }

    impl Default for FakeKeyService {
        fn default() -> Self {
            Self {
                host_challenge: [0x11; 8],
                shared_secret: [0x5A; 16],
                session_key: [0x40; 16],
                enc_key: [0x41; 16],
                host_cryptogram: [0x22; 8],
                status: 0,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl FakeKeyService {
        /// Number of session key requests received
        pub fn session_key_calls(&self) -> usize {
            self.requests.lock().map_or(0, |requests| requests.len())
        }
    }

    impl KeyDerivationService for FakeKeyService {
        fn compute_random_data(&self, size: usize) -> Result<RandomData, KdsError> {
            let data = self.host_challenge.iter().copied().cycle().take(size).collect::<Vec<_>>();
            Ok(RandomData {
                status: self.status,
                data: Buffer::from(data),
            })
        }

        fn compute_session_key(
            &self,
            request: &SessionKeyRequest,
        ) -> Result<SessionKeyResponse, KdsError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }
            let secret = Key::<Scp02>::clone_from_slice(&self.shared_secret);
            let wrap = |key: &[u8; 16]| {
                ecb_encrypt(&secret, key)
                    .map(Buffer::from)
                    .map_err(|e| KdsError::Unavailable(e.to_string()))
            };
            Ok(SessionKeyResponse {
                status: self.status,
                wrapped_session_key: wrap(&self.session_key)?,
                wrapped_enc_key: wrap(&self.enc_key)?,
                host_cryptogram: Buffer::from(self.host_cryptogram.to_vec()),
            })
        }
    }
}
