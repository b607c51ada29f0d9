//! Collaborators shared by every format attempt
//!
//! Nothing here is global: a [`FormatContext`] is built once and lent to each
//! [`FormatProcessor`](crate::processor::FormatProcessor).

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

use tps_apdu_globalplatform::{ChannelError, KdsError, KeyDerivationService, KeyStore, SoftKeyStore};
use tps_policy::{AuthenticatorRegistry, ConfigStore, ResolverRegistry};

use crate::settings::FormatSettings;

/// Lookup of tokens already known to the system
pub trait TokenDirectory: Send + Sync + fmt::Debug {
    /// Whether a token with this CUID is registered
    fn contains(&self, cuid: &str) -> bool;
}

/// In-memory token directory
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    cuids: BTreeSet<String>,
}

impl MemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a CUID, compared case-insensitively
    pub fn with_token(mut self, cuid: impl AsRef<str>) -> Self {
        self.cuids.insert(cuid.as_ref().to_ascii_uppercase());
        self
    }
}

impl TokenDirectory for MemoryDirectory {
    fn contains(&self, cuid: &str) -> bool {
        self.cuids.contains(&cuid.to_ascii_uppercase())
    }
}

/// Configuration and services used by the format workflow
#[derive(Debug, Clone)]
pub struct FormatContext {
    /// Configuration store
    pub config: ConfigStore,
    /// Token profile resolvers
    pub resolvers: ResolverRegistry,
    /// Operator authenticators
    pub authenticators: AuthenticatorRegistry,
    /// Key-derivation services by connector id
    pub key_services: BTreeMap<String, Arc<dyn KeyDerivationService>>,
    /// Shared-secret key store
    pub keystore: Arc<dyn KeyStore>,
    /// Known tokens
    pub directory: Arc<dyn TokenDirectory>,
}

impl FormatContext {
    /// Context with empty registries, no key services and an empty key store
    pub fn new(config: ConfigStore) -> Self {
        Self {
            config,
            resolvers: ResolverRegistry::new(),
            authenticators: AuthenticatorRegistry::new(),
            key_services: BTreeMap::new(),
            keystore: Arc::new(SoftKeyStore::new()),
            directory: Arc::new(MemoryDirectory::new()),
        }
    }

    /// Use these resolvers
    pub fn with_resolvers(mut self, resolvers: ResolverRegistry) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// Use these authenticators
    pub fn with_authenticators(mut self, authenticators: AuthenticatorRegistry) -> Self {
        self.authenticators = authenticators;
        self
    }

    /// Register the key service for a connector
    pub fn with_key_service(
        mut self,
        connector: impl Into<String>,
        service: Arc<dyn KeyDerivationService>,
    ) -> Self {
        self.key_services.insert(connector.into(), service);
        self
    }

    /// Use this key store
    pub fn with_keystore(mut self, keystore: Arc<dyn KeyStore>) -> Self {
        self.keystore = keystore;
        self
    }

    /// Use this token directory
    pub fn with_directory(mut self, directory: Arc<dyn TokenDirectory>) -> Self {
        self.directory = directory;
        self
    }

    /// Key service for a connector
    pub fn key_service(&self, connector: &str) -> Result<&dyn KeyDerivationService, ChannelError> {
        self.key_services
            .get(connector)
            .map(|service| service.as_ref())
            .ok_or_else(|| {
                let error = KdsError::UnknownConnector(connector.to_string());
                ChannelError::KeyDerivation(error.to_string())
            })
    }

    /// Typed view of the configuration
    pub const fn settings(&self) -> FormatSettings<'_> {
        FormatSettings::new(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tps_apdu_globalplatform::kds::mock::FakeKeyService;

    #[test]
    fn test_directory_is_case_insensitive() {
        let directory = MemoryDirectory::new().with_token("a0b1c2");
        assert!(directory.contains("A0B1C2"));
        assert!(!directory.contains("A0B1C3"));
    }

    #[test]
    fn test_key_service_lookup() {
        let context = FormatContext::new(ConfigStore::new())
            .with_key_service("tks1", Arc::new(FakeKeyService::default()));
        assert!(context.key_service("tks1").is_ok());
        assert!(matches!(
            context.key_service("tks2"),
            Err(ChannelError::KeyDerivation(message)) if message.contains("tks2")
        ));
    }
}
