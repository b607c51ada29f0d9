//! Typed view of the format configuration
//!
//! Every setting the workflow reads goes through [`FormatSettings`], with its
//! default applied here.

use std::path::PathBuf;

use serde::Serialize;
use tps_apdu_core::Buffer;
use tps_apdu_globalplatform::{
    DEFAULT_BLOCK_SIZE, DEFAULT_SHARED_SECRET_NAME, INTERNAL_KEY_STORAGE_TOKEN, SharedSecretRef,
};
use tps_policy::{ConfigError, ConfigStore};

/// Default card manager instance AID
pub const DEFAULT_CARD_MANAGER_AID: &str = "A0000000030000";
/// Default token applet instance AID
pub const DEFAULT_NETKEY_INSTANCE_AID: &str = "627601FF000000";
/// Default token applet package AID
pub const DEFAULT_NETKEY_FILE_AID: &str = "627601FF0000";
/// Default applet file extension
pub const DEFAULT_APPLET_EXTENSION: &str = "ijc";
/// Default token profile resolver
pub const DEFAULT_RESOLVER: &str = "formatMappingResolver";
/// Default key service connector
pub const DEFAULT_TKS_CONNECTOR: &str = "tks1";
/// Default applet instance size
pub const DEFAULT_INSTANCE_SIZE: u16 = 18000;
/// Default applet memory size
pub const DEFAULT_APPLET_MEMORY_SIZE: u16 = 5000;

const OP: &str = "op.format";

/// Format settings backed by a configuration store
#[derive(Debug, Clone, Copy)]
pub struct FormatSettings<'a> {
    config: &'a ConfigStore,
}

impl<'a> FormatSettings<'a> {
    /// View a configuration store
    pub const fn new(config: &'a ConfigStore) -> Self {
        Self { config }
    }

    fn aid(&self, key: &str, default: &str) -> Result<Buffer, ConfigError> {
        let value = self.config.get_str(key).unwrap_or(default);
        Buffer::from_hex(value).map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Card manager instance AID
    pub fn card_manager_aid(&self) -> Result<Buffer, ConfigError> {
        self.aid("applet.aid.cardmgr_instance", DEFAULT_CARD_MANAGER_AID)
    }

    /// Token applet instance AID
    pub fn netkey_instance_aid(&self) -> Result<Buffer, ConfigError> {
        self.aid("applet.aid.netkey_instance", DEFAULT_NETKEY_INSTANCE_AID)
    }

    /// Token applet package AID
    pub fn netkey_file_aid(&self) -> Result<Buffer, ConfigError> {
        self.aid("applet.aid.netkey_file", DEFAULT_NETKEY_FILE_AID)
    }

    /// Applet file extension
    pub fn applet_extension(&self) -> String {
        self.config.get_string_or("general.applet_ext", DEFAULT_APPLET_EXTENSION)
    }

    /// Whether external registration is on
    pub fn external_reg_enabled(&self) -> Result<bool, ConfigError> {
        self.config.get_bool_or("externalReg.enable", false)
    }

    /// Resolver instance name, `none` disables resolution
    pub fn resolver_name(&self) -> String {
        self.config.get_string_or(&format!("{OP}.tokenProfileResolver"), DEFAULT_RESOLVER)
    }

    /// Whether operators must log in for a token type
    pub fn auth_enabled(&self, token_type: &str) -> Result<bool, ConfigError> {
        self.config.get_bool_or(&format!("{OP}.{token_type}.auth.enable"), true)
    }

    /// Authenticator instance for a token type
    pub fn auth_id(&self, token_type: &str) -> Result<&'a str, ConfigError> {
        self.config.require(&format!("{OP}.{token_type}.auth.id"))
    }

    /// Whether a token type's profile is enabled
    pub fn profile_enabled(&self, token_type: &str) -> bool {
        self.config
            .get_str(&format!("config.Profiles.{token_type}.state"))
            .is_none_or(|state| state == "Enabled")
    }

    /// Whether tokens missing from the directory may be formatted
    pub fn allow_unknown_token(&self) -> Result<bool, ConfigError> {
        self.config.get_bool_or(&format!("{OP}.allowUnknownToken"), true)
    }

    /// Whether tokens without an applet may be formatted
    pub fn allow_no_applet(&self, token_type: &str) -> Result<bool, ConfigError> {
        self.config
            .get_bool_or(&format!("{OP}.{token_type}.update.applet.emptyToken.enable"), true)
    }

    /// Applet version to install, if any
    pub fn required_version(&self, token_type: &str) -> Option<&'a str> {
        self.config
            .get_str(&format!("{OP}.{token_type}.update.applet.requiredVersion"))
            .filter(|version| !version.is_empty())
    }

    /// Path of the applet file for a version
    pub fn applet_path(&self, token_type: &str, version: &str) -> Result<PathBuf, ConfigError> {
        let directory = self
            .config
            .require(&format!("{OP}.{token_type}.update.applet.directory"))?;
        Ok(PathBuf::from(directory).join(format!("{version}.{}", self.applet_extension())))
    }

    /// Key service connector for a token type
    pub fn tks_connector(&self, token_type: &str) -> String {
        self.config
            .get_string_or(&format!("{OP}.{token_type}.tks.conn"), DEFAULT_TKS_CONNECTOR)
    }

    /// Shared secret used with a connector
    pub fn shared_secret(&self, connector: &str) -> SharedSecretRef {
        SharedSecretRef::new(
            self.config.get_string_or(
                &format!("conn.{connector}.tksSharedSymKeyToken"),
                INTERNAL_KEY_STORAGE_TOKEN,
            ),
            self.config.get_string_or(
                &format!("conn.{connector}.tksSharedSymKeyName"),
                DEFAULT_SHARED_SECRET_NAME,
            ),
        )
    }

    /// Whether a connector generates keys server-side
    pub fn server_keygen(&self, connector: &str) -> Result<bool, ConfigError> {
        self.config.get_bool_or(&format!("conn.{connector}.serverKeygen"), false)
    }

    /// Key version for INITIALIZE UPDATE
    pub fn key_version(&self) -> Result<u8, ConfigError> {
        self.config.get_int_or("channel.defKeyVersion", 0)
    }

    /// Key index for INITIALIZE UPDATE
    pub fn key_index(&self) -> Result<u8, ConfigError> {
        self.config.get_int_or("channel.defKeyIndex", 0)
    }

    /// LOAD block size
    pub fn block_size(&self) -> Result<usize, ConfigError> {
        self.config.get_int_or("channel.blockSize", DEFAULT_BLOCK_SIZE)
    }

    /// Applet instance size
    pub fn instance_size(&self) -> Result<u16, ConfigError> {
        self.config.get_int_or("channel.instanceSize", DEFAULT_INSTANCE_SIZE)
    }

    /// Applet memory size
    pub fn applet_memory_size(&self) -> Result<u16, ConfigError> {
        self.config.get_int_or("channel.appletMemorySize", DEFAULT_APPLET_MEMORY_SIZE)
    }

    /// Whether issuer info is written
    pub fn issuer_info_enabled(&self, token_type: &str) -> Result<bool, ConfigError> {
        self.config.get_bool_or(&format!("{OP}.{token_type}.issuerinfo.enable"), false)
    }

    /// Issuer info value, which must be ASCII
    pub fn issuer_info_value(&self, token_type: &str) -> Result<&'a str, ConfigError> {
        let key = format!("{OP}.{token_type}.issuerinfo.value");
        let value = self.config.require(&key)?;
        if !value.is_ascii() {
            return Err(ConfigError::Invalid {
                key,
                value: value.to_string(),
            });
        }
        Ok(value)
    }

    /// Effective settings for a token type
    pub fn snapshot(&self, token_type: &str) -> Result<EffectiveSettings, ConfigError> {
        let connector = self.tks_connector(token_type);
        let shared_secret = self.shared_secret(&connector);
        Ok(EffectiveSettings {
            token_type: token_type.to_string(),
            card_manager_aid: self.card_manager_aid()?.to_hex(),
            netkey_instance_aid: self.netkey_instance_aid()?.to_hex(),
            netkey_file_aid: self.netkey_file_aid()?.to_hex(),
            resolver: self.resolver_name(),
            external_reg: self.external_reg_enabled()?,
            auth_enabled: self.auth_enabled(token_type)?,
            auth_id: self.config.get_str(&format!("{OP}.{token_type}.auth.id")).map(str::to_string),
            profile_enabled: self.profile_enabled(token_type),
            allow_unknown_token: self.allow_unknown_token()?,
            allow_no_applet: self.allow_no_applet(token_type)?,
            required_version: self.required_version(token_type).map(str::to_string),
            applet_extension: self.applet_extension(),
            server_keygen: self.server_keygen(&connector)?,
            tks_connector: connector,
            shared_secret: shared_secret.to_string(),
            key_version: self.key_version()?,
            key_index: self.key_index()?,
            block_size: self.block_size()?,
            instance_size: self.instance_size()?,
            applet_memory_size: self.applet_memory_size()?,
            issuer_info_enabled: self.issuer_info_enabled(token_type)?,
        })
    }
}

/// Resolved settings for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct EffectiveSettings {
    pub token_type: String,
    pub card_manager_aid: String,
    pub netkey_instance_aid: String,
    pub netkey_file_aid: String,
    pub resolver: String,
    pub external_reg: bool,
    pub auth_enabled: bool,
    pub auth_id: Option<String>,
    pub profile_enabled: bool,
    pub allow_unknown_token: bool,
    pub allow_no_applet: bool,
    pub required_version: Option<String>,
    pub applet_extension: String,
    pub tks_connector: String,
    pub shared_secret: String,
    pub server_keygen: bool,
    pub key_version: u8,
    pub key_index: u8,
    pub block_size: usize,
    pub instance_size: u16,
    pub applet_memory_size: u16,
    pub issuer_info_enabled: bool,
}
