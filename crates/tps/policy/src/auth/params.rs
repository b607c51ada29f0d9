//! UI parameters presented in extended login

use std::collections::BTreeMap;

use crate::config::ConfigStore;

/// Fallback locale
pub const DEFAULT_LOCALE: &str = "en";

/// Names a credential travels under
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredMap {
    /// Name the backend expects
    pub auth_cred: String,
    /// Field name in a plain login response
    pub login: String,
    /// Field name in an extended login response
    pub ext_login: String,
}

/// One credential the client is asked for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiParameter {
    /// Parameter id
    pub id: String,
    /// Display name per locale
    pub names: BTreeMap<String, String>,
    /// Description per locale
    pub descriptions: BTreeMap<String, String>,
    /// Input type shown by the client
    pub kind: String,
    /// Options shown by the client
    pub option: String,
    /// Credential name mapping
    pub cred_map: CredMap,
}

impl UiParameter {
    /// Read `<prefix>.<id>.*` from configuration
    pub fn from_config(config: &ConfigStore, prefix: &str, id: &str) -> Self {
        let base = format!("{prefix}.{id}");
        let default_kind = if id.eq_ignore_ascii_case("PASSWORD") { "password" } else { "string" };
        Self {
            id: id.to_string(),
            names: localized(config, &format!("{base}.name")),
            descriptions: localized(config, &format!("{base}.description")),
            kind: config.get_string_or(&format!("{base}.type"), default_kind),
            option: config.get_string_or(&format!("{base}.option"), ""),
            cred_map: CredMap {
                auth_cred: config.get_string_or(&format!("{base}.credMap.authCred"), id),
                login: config.get_string_or(&format!("{base}.credMap.msgCred.login"), id),
                ext_login: config.get_string_or(&format!("{base}.credMap.msgCred.extlogin"), id),
            },
        }
    }

    /// Display name in a locale
    pub fn name(&self, locale: &str) -> &str {
        lookup(&self.names, locale).unwrap_or(&self.id)
    }

    /// Description in a locale
    pub fn description(&self, locale: &str) -> &str {
        lookup(&self.descriptions, locale).unwrap_or_default()
    }

    /// Render as sent in an extended login request
    pub fn render(&self, locale: &str) -> String {
        format!(
            "id={}&name={}&desc={}&type={}&option={}",
            self.id,
            self.name(locale),
            self.description(locale),
            self.kind,
            self.option
        )
    }
}

/// Values of `<prefix>.<locale>` keys
pub(crate) fn localized(config: &ConfigStore, prefix: &str) -> BTreeMap<String, String> {
    config
        .children(prefix)
        .into_iter()
        .filter_map(|locale| {
            let value = config.get_str(&format!("{prefix}.{locale}"))?.to_string();
            Some((locale, value))
        })
        .collect()
}

/// Look up a locale, falling back to the default locale
pub(crate) fn lookup<'a>(values: &'a BTreeMap<String, String>, locale: &str) -> Option<&'a str> {
    values
        .get(locale)
        .or_else(|| values.get(DEFAULT_LOCALE))
        .map(String::as_str)
}
