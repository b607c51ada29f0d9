//! Authenticator instances
//!
//! An authenticator couples the UI shown during extended login with the
//! backend that checks what the client returns. Instances are configured
//! under `auths.instance.<id>`.

use std::{collections::BTreeMap, sync::Arc};

use tracing::debug;

use super::{
    AuthError,
    backend::{AuthBackend, ExternalAuth, PasswordTable},
    params::{UiParameter, localized, lookup},
};
use crate::config::ConfigStore;

/// Plugin name selecting the built-in password table
pub const PASSWORD_TABLE_PLUGIN: &str = "PasswordTable";

/// One configured authenticator
#[derive(Debug, Clone)]
pub struct Authenticator {
    /// Instance id
    pub id: String,
    /// Title per locale
    pub titles: BTreeMap<String, String>,
    /// Description per locale
    pub descriptions: BTreeMap<String, String>,
    /// Credentials asked for, in order
    pub params: Vec<UiParameter>,
    /// Credential checker
    pub backend: AuthBackend,
}

impl Authenticator {
    /// Localized title, falling back to the instance id
    pub fn title(&self, locale: &str) -> &str {
        lookup(&self.titles, locale).unwrap_or(&self.id)
    }

    /// Localized description
    pub fn description(&self, locale: &str) -> &str {
        lookup(&self.descriptions, locale).unwrap_or_default()
    }

    /// Read an instance from configuration
    pub fn from_config(
        config: &ConfigStore,
        id: &str,
        externals: &BTreeMap<String, Arc<dyn ExternalAuth>>,
    ) -> Result<Self, AuthError> {
        let prefix = format!("auths.instance.{id}");
        let plugin_key = format!("{prefix}.pluginName");
        let plugin = config.require(&plugin_key)?;

        let backend = if plugin == PASSWORD_TABLE_PLUGIN {
            AuthBackend::PasswordTable(PasswordTable::from_config(config, &prefix))
        } else {
            let external = externals
                .get(plugin)
                .ok_or_else(|| crate::config::invalid(&plugin_key, plugin))?;
            AuthBackend::External(Arc::clone(external))
        };

        let params_prefix = format!("{prefix}.ui.id");
        let params = config
            .children(&params_prefix)
            .iter()
            .map(|param| UiParameter::from_config(config, &params_prefix, param))
            .collect();

        Ok(Self {
            id: id.to_string(),
            titles: localized(config, &format!("{prefix}.ui.title")),
            descriptions: localized(config, &format!("{prefix}.ui.description")),
            params,
            backend,
        })
    }
}

/// Authenticators by instance id
#[derive(Debug, Clone, Default)]
pub struct AuthenticatorRegistry {
    authenticators: BTreeMap<String, Authenticator>,
}

impl AuthenticatorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every instance under `auths.instance`
    ///
    /// Plugins other than the password table are looked up in `externals`.
    pub fn from_config(
        config: &ConfigStore,
        externals: &BTreeMap<String, Arc<dyn ExternalAuth>>,
    ) -> Result<Self, AuthError> {
        let mut registry = Self::new();
        for id in config.children("auths.instance") {
            let authenticator = Authenticator::from_config(config, &id, externals)?;
            debug!(id = %id, params = authenticator.params.len(), "Loaded authenticator");
            registry.register(authenticator);
        }
        Ok(registry)
    }

    /// Add or replace an instance
    pub fn register(&mut self, authenticator: Authenticator) -> &mut Self {
        self.authenticators.insert(authenticator.id.clone(), authenticator);
        self
    }

    /// Look up an instance
    pub fn get(&self, id: &str) -> Result<&Authenticator, AuthError> {
        self.authenticators
            .get(id)
            .ok_or_else(|| AuthError::UnknownAuthenticator(id.to_string()))
    }
}
