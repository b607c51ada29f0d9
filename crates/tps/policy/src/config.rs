//! Flat key/value configuration store
//!
//! Configuration is a flat map of dotted keys, loaded from `key=value` text or
//! from a JSON object. Nested JSON objects are flattened into dotted keys.

use std::{collections::BTreeMap, fs, path::Path, str::FromStr};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required key is absent
    #[error("missing configuration key {0}")]
    Missing(String),

    /// A value could not be parsed
    #[error("invalid value {value:?} for {key}")]
    Invalid {
        /// Key holding the value
        key: String,
        /// Offending value
        value: String,
    },

    /// A text line is not `key=value`
    #[error("line {line}: expected key=value")]
    Parse {
        /// One-based line number
        line: usize,
    },

    /// JSON configuration could not be read
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// JSON configuration is not an object
    #[error("JSON configuration must be an object")]
    NotAnObject,

    /// File could not be read
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Flat configuration store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigStore {
    entries: BTreeMap<String, String>,
}

impl ConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `key=value` lines; blank lines and `#` comments are skipped
    pub fn from_properties(text: &str) -> Result<Self, ConfigError> {
        let mut entries = BTreeMap::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or(ConfigError::Parse { line: index + 1 })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::Parse { line: index + 1 });
            }
            entries.insert(key.to_string(), value.trim().to_string());
        }
        Ok(Self { entries })
    }

    /// Parse a JSON object, flattening nested objects into dotted keys
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let Value::Object(map) = serde_json::from_str::<Value>(text)? else {
            return Err(ConfigError::NotAnObject);
        };
        let mut entries = BTreeMap::new();
        for (key, value) in map {
            flatten(&key, value, &mut entries);
        }
        Ok(Self { entries })
    }

    /// Load a file, as JSON when it has a `.json` extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let store = if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json(&text)?
        } else {
            Self::from_properties(&text)?
        };
        debug!(path = %path.display(), entries = store.len(), "Loaded configuration");
        Ok(store)
    }

    /// Set a value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Builder form of [`set`](Self::set)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw value of a key
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Value of a key, or a default
    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_str(key).unwrap_or(default).to_string()
    }

    /// Value of a key, failing when absent
    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get_str(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    /// Boolean value of a key (`true`/`false`, any case), or a default
    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get_str(key) {
            None => Ok(default),
            Some(value) if value.eq_ignore_ascii_case("true") => Ok(true),
            Some(value) if value.eq_ignore_ascii_case("false") => Ok(false),
            Some(value) => Err(invalid(key, value)),
        }
    }

    /// Parsed value of a key, or a default
    pub fn get_int_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        self.get_str(key)
            .map_or(Ok(default), |value| value.parse().map_err(|_| invalid(key, value)))
    }

    /// Comma-separated list value, empty when absent
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get_str(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Distinct key segments directly below `prefix`
    ///
    /// For keys `a.x.1` and `a.y` the children of `a` are `x` and `y`.
    pub fn children(&self, prefix: &str) -> Vec<String> {
        let prefix = format!("{prefix}.");
        let mut children: Vec<String> = self
            .entries
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| key[prefix.len()..].split('.').next())
            .map(str::to_string)
            .collect();
        children.sort();
        children.dedup();
        children
    }
}

pub(crate) fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn flatten(prefix: &str, value: Value, entries: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                flatten(&format!("{prefix}.{key}"), value, entries);
            }
        }
        Value::String(text) => {
            entries.insert(prefix.to_string(), text);
        }
        Value::Null => {}
        other => {
            entries.insert(prefix.to_string(), other.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties() {
        let config = ConfigStore::from_properties(
            "# comment\n\nop.format.tokenKey.auth.enable=false\nchannel.blockSize = 200\n",
        )
        .unwrap();
        assert!(!config.get_bool_or("op.format.tokenKey.auth.enable", true).unwrap());
        assert_eq!(config.get_int_or("channel.blockSize", 242usize).unwrap(), 200);
        assert_eq!(config.get_int_or("channel.instanceSize", 18000u16).unwrap(), 18000);
        assert!(config.require("missing").is_err());

        assert!(matches!(
            ConfigStore::from_properties("a=1\nbroken"),
            Err(ConfigError::Parse { line: 2 })
        ));
    }

    #[test]
    fn test_json_flattening() {
        let config = ConfigStore::from_json(
            r#"{
                "op": {"format": {"allowUnknownToken": false}},
                "channel.blockSize": 128,
                "x": null
            }"#,
        )
        .unwrap();
        assert_eq!(config.get_str("op.format.allowUnknownToken"), Some("false"));
        assert_eq!(config.get_str("channel.blockSize"), Some("128"));
        assert_eq!(config.get_str("x"), None);
        assert!(matches!(ConfigStore::from_json("[1]"), Err(ConfigError::NotAnObject)));
    }

    #[test]
    fn test_invalid_values() {
        let config = ConfigStore::new().with("flag", "yes").with("size", "big");
        assert!(matches!(config.get_bool_or("flag", true), Err(ConfigError::Invalid { .. })));
        assert!(config.get_int_or("size", 1u16).is_err());
    }

    #[test]
    fn test_children_and_lists() {
        let config = ConfigStore::new()
            .with("auths.instance.ldap1.ui.id.UID.name.en", "User")
            .with("auths.instance.ldap1.ui.id.PASSWORD.name.en", "Password")
            .with("auths.instance.ldap1.ui.id.UID.credMap.authCred", "uid")
            .with("list", "a, b,,c");
        assert_eq!(
            config.children("auths.instance.ldap1.ui.id"),
            vec!["PASSWORD".to_string(), "UID".to_string()]
        );
        assert_eq!(config.get_list("list"), vec!["a", "b", "c"]);
        assert!(config.get_list("none").is_empty());
    }
}
