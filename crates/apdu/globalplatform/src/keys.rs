//! Session keys and the shared-secret key store
//!
//! Session keys arrive from the key-derivation service wrapped under a shared
//! secret held in a key-storage token. A [`KeyStore`] lists the keys a token
//! holds and unwraps key material with them.

use std::{collections::BTreeMap, fmt};

use cipher::Key;
use derive_more::Display;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    ChannelError, Result,
    crypto::{Scp02, ecb_decrypt},
};

/// Name of the built-in key-storage token
pub const INTERNAL_KEY_STORAGE_TOKEN: &str = "Internal Key Storage Token";

/// Default shared-secret key name
pub const DEFAULT_SHARED_SECRET_NAME: &str = "sharedSecret";

/// Two-key 3DES key, wiped on drop
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; 16]);

impl SymmetricKey {
    /// Wrap raw key bytes
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Build a key from a slice, which must be exactly 16 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 16] = bytes.try_into().map_err(|_| {
            ChannelError::KeyUnwrap(format!("expected 16 key bytes, got {}", bytes.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Key as a cipher key reference
    pub fn as_key(&self) -> &Key<Scp02> {
        Key::<Scp02>::from_slice(&self.0)
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// Location of the shared secret
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{token}:{name}")]
pub struct SharedSecretRef {
    /// Key-storage token holding the key
    pub token: String,
    /// Key name inside the token
    pub name: String,
}

impl SharedSecretRef {
    /// Reference a named key in a token
    pub fn new(token: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            name: name.into(),
        }
    }
}

impl Default for SharedSecretRef {
    fn default() -> Self {
        Self::new(INTERNAL_KEY_STORAGE_TOKEN, DEFAULT_SHARED_SECRET_NAME)
    }
}

/// Provider of shared-secret keys
pub trait KeyStore: Send + Sync + fmt::Debug {
    /// Names of the keys held by a token
    fn key_names(&self, token: &str) -> Vec<String>;

    /// Unwrap key material with a named key
    fn unwrap_key(&self, secret: &SharedSecretRef, wrapped: &[u8]) -> Result<SymmetricKey>;
}

/// In-memory key store unwrapping with two-key 3DES-ECB
#[derive(Debug, Default)]
pub struct SoftKeyStore {
    tokens: BTreeMap<String, BTreeMap<String, SymmetricKey>>,
}

impl SoftKeyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key to a token
    pub fn with_key(
        mut self,
        token: impl Into<String>,
        name: impl Into<String>,
        key: SymmetricKey,
    ) -> Self {
        self.insert(token, name, key);
        self
    }

    /// Add a key to a token
    pub fn insert(&mut self, token: impl Into<String>, name: impl Into<String>, key: SymmetricKey) {
        self.tokens.entry(token.into()).or_default().insert(name.into(), key);
    }
}

impl KeyStore for SoftKeyStore {
    fn key_names(&self, token: &str) -> Vec<String> {
        self.tokens
            .get(token)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn unwrap_key(&self, secret: &SharedSecretRef, wrapped: &[u8]) -> Result<SymmetricKey> {
        let key = self
            .tokens
            .get(&secret.token)
            .and_then(|keys| keys.get(&secret.name))
            .ok_or_else(|| ChannelError::KeyUnwrap(format!("no key {secret}")))?;

        debug!(secret = %secret, "Unwrapping key material");
        let mut plain = ecb_decrypt(key.as_key(), wrapped)
            .map_err(|e| ChannelError::KeyUnwrap(e.to_string()))?;
        let unwrapped = SymmetricKey::from_slice(&plain);
        plain.zeroize();
        unwrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ecb_encrypt;
    use hex_literal::hex;

    #[test]
    fn test_soft_key_store_unwrap() {
        let secret = SymmetricKey::new(hex!("00112233445566778899aabbccddeeff"));
        let wrapped =
            ecb_encrypt(secret.as_key(), &hex!("404142434445464748494a4b4c4d4e4f")).unwrap();
        let store =
            SoftKeyStore::new().with_key(INTERNAL_KEY_STORAGE_TOKEN, "sharedSecret", secret);

        assert_eq!(store.key_names(INTERNAL_KEY_STORAGE_TOKEN), vec!["sharedSecret".to_string()]);
        assert!(store.key_names("other").is_empty());

        let key = store.unwrap_key(&SharedSecretRef::default(), &wrapped).unwrap();
        assert_eq!(key, SymmetricKey::new(hex!("404142434445464748494a4b4c4d4e4f")));
    }

    #[test]
    fn test_unwrap_errors() {
        let store = SoftKeyStore::new().with_key("t", "k", SymmetricKey::new([1; 16]));
        assert!(matches!(
            store.unwrap_key(&SharedSecretRef::new("t", "missing"), &[0; 16]),
            Err(ChannelError::KeyUnwrap(_))
        ));
        assert!(matches!(
            store.unwrap_key(&SharedSecretRef::new("t", "k"), &[0; 8]),
            Err(ChannelError::KeyUnwrap(_))
        ));
        assert!(matches!(
            store.unwrap_key(&SharedSecretRef::new("t", "k"), &[0; 15]),
            Err(ChannelError::KeyUnwrap(_))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        assert_eq!(format!("{:?}", SymmetricKey::new([7; 16])), "SymmetricKey(..)");
    }
}
