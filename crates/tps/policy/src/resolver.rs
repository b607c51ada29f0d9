//! Token profile resolution
//!
//! A resolver maps what is known about a card (identifiers, applet version and
//! client hints) to the token type whose policy applies. Resolvers are named
//! instances built from configuration:
//!
//! ```text
//! tokenProfileResolver.list=formatMappingResolver
//! tokenProfileResolver.formatMappingResolver.class=...MappingResolver
//! tokenProfileResolver.formatMappingResolver.format.mapping.order=0,1
//! tokenProfileResolver.formatMappingResolver.format.mapping.0.filter.tokenATR=3B..
//! tokenProfileResolver.formatMappingResolver.format.mapping.0.target.tokenType=tokenKey
//! ```

use std::{cmp::Ordering, collections::BTreeMap};

use thiserror::Error;
use tracing::{debug, trace};

use crate::config::{ConfigError, ConfigStore};

/// Reserved resolver name disabling resolution
pub const NO_RESOLVER: &str = "none";

/// Resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No resolver instance with this name
    #[error("unknown token profile resolver {0}")]
    UnknownResolver(String),

    /// No mapping rule matched the card
    #[error("no token type mapping matched for {op}")]
    NoMatch {
        /// Operation being resolved
        op: String,
    },

    /// Resolver configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What is known about the card when resolving
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverParams {
    /// Operation name, e.g. `format`
    pub op: String,
    /// Card identifier, hex
    pub cuid: String,
    /// Manufacturer serial number, hex
    pub msn: String,
    /// Applet major version
    pub major_version: u8,
    /// Applet minor version
    pub minor_version: u8,
    /// Token type hinted by the client
    pub ext_token_type: Option<String>,
    /// ATR reported by the client
    pub ext_token_atr: Option<String>,
}

/// Inclusive CUID range
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CuidRange {
    /// Lower bound
    pub start: Option<String>,
    /// Upper bound
    pub end: Option<String>,
}

impl CuidRange {
    /// Bounds only constrain CUIDs of the same length; comparison ignores case
    fn contains(&self, cuid: &str) -> bool {
        let cuid = cuid.to_ascii_uppercase();
        let within = |bound: &Option<String>, reject: Ordering| match bound {
            None => true,
            Some(bound) => {
                bound.len() == cuid.len()
                    && cuid.as_str().cmp(bound.to_ascii_uppercase().as_str()) != reject
            }
        };
        within(&self.start, Ordering::Less) && within(&self.end, Ordering::Greater)
    }
}

/// One ordered mapping rule
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingRule {
    /// Rule identifier
    pub id: String,
    /// Required client token type hint
    pub token_type: Option<String>,
    /// Required ATR
    pub token_atr: Option<String>,
    /// CUID range
    pub cuid: CuidRange,
    /// Required applet major version
    pub major_version: Option<u8>,
    /// Required applet minor version
    pub minor_version: Option<u8>,
    /// Token type produced on match
    pub target: String,
}

impl MappingRule {
    /// Whether the rule matches
    pub fn matches(&self, params: &ResolverParams) -> bool {
        let hint = |filter: &Option<String>, actual: &Option<String>| match (filter, actual) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(filter), Some(actual)) => filter == actual,
        };
        hint(&self.token_type, &params.ext_token_type)
            && hint(&self.token_atr, &params.ext_token_atr)
            && self.cuid.contains(&params.cuid)
            && self.major_version.is_none_or(|major| major == params.major_version)
            && self.minor_version.is_none_or(|minor| minor == params.minor_version)
    }
}

/// Token profile resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolver {
    /// Always yields one token type
    Fixed(String),
    /// Ordered rules per operation; first match wins
    Mapping(BTreeMap<String, Vec<MappingRule>>),
}

impl Resolver {
    /// Resolve a token type
    pub fn resolve(&self, params: &ResolverParams) -> Result<String, ResolveError> {
        match self {
            Self::Fixed(token_type) => Ok(token_type.clone()),
            Self::Mapping(ops) => {
                let rule = ops
                    .get(&params.op)
                    .into_iter()
                    .flatten()
                    .find(|rule| {
                        let matched = rule.matches(params);
                        trace!(rule = %rule.id, matched, "Evaluated mapping rule");
                        matched
                    })
                    .ok_or_else(|| ResolveError::NoMatch {
                        op: params.op.clone(),
                    })?;
                debug!(rule = %rule.id, token_type = %rule.target, "Resolved token type");
                Ok(rule.target.clone())
            }
        }
    }

    /// Build a resolver instance from configuration
    pub fn from_config(config: &ConfigStore, name: &str) -> Result<Self, ResolveError> {
        let prefix = format!("tokenProfileResolver.{name}");
        let class_key = format!("{prefix}.class");
        let class = config.require(&class_key)?;

        if class.ends_with("FixedResolver") {
            return Ok(Self::Fixed(config.require(&format!("{prefix}.tokenType"))?.to_string()));
        }
        if !class.ends_with("MappingResolver") {
            return Err(crate::config::invalid(&class_key, class).into());
        }

        let mut ops = BTreeMap::new();
        for op in config.children(&prefix) {
            let mapping = format!("{prefix}.{op}.mapping");
            let Some(order) = config.get_str(&format!("{mapping}.order")) else {
                continue;
            };
            let mut rules = Vec::new();
            for id in order.split(',').map(str::trim).filter(|id| !id.is_empty()) {
                rules.push(rule_from_config(config, &format!("{mapping}.{id}"), id)?);
            }
            ops.insert(op, rules);
        }
        Ok(Self::Mapping(ops))
    }
}

fn rule_from_config(
    config: &ConfigStore,
    prefix: &str,
    id: &str,
) -> Result<MappingRule, ConfigError> {
    let filter = |name: &str| {
        config
            .get_str(&format!("{prefix}.filter.{name}"))
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    let version = |name: &str| -> Result<Option<u8>, ConfigError> {
        filter(name)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| crate::config::invalid(&format!("{prefix}.filter.{name}"), &value))
            })
            .transpose()
    };

    Ok(MappingRule {
        id: id.to_string(),
        token_type: filter("tokenType"),
        token_atr: filter("tokenATR"),
        cuid: CuidRange {
            start: filter("tokenCUID.start"),
            end: filter("tokenCUID.end"),
        },
        major_version: version("appletMajorVersion")?,
        minor_version: version("appletMinorVersion")?,
        target: config.require(&format!("{prefix}.target.tokenType"))?.to_string(),
    })
}

/// Named resolver instances
#[derive(Debug, Clone, Default)]
pub struct ResolverRegistry {
    resolvers: BTreeMap<String, Resolver>,
}

impl ResolverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every instance listed in `tokenProfileResolver.list`
    pub fn from_config(config: &ConfigStore) -> Result<Self, ResolveError> {
        let mut registry = Self::new();
        for name in config.get_list("tokenProfileResolver.list") {
            let resolver = Resolver::from_config(config, &name)?;
            registry.register(name, resolver);
        }
        Ok(registry)
    }

    /// Add or replace an instance
    pub fn register(&mut self, name: impl Into<String>, resolver: Resolver) -> &mut Self {
        self.resolvers.insert(name.into(), resolver);
        self
    }

    /// Look up an instance
    pub fn get(&self, name: &str) -> Result<&Resolver, ResolveError> {
        self.resolvers
            .get(name)
            .ok_or_else(|| ResolveError::UnknownResolver(name.to_string()))
    }

    /// Resolve with a named instance
    pub fn resolve(&self, name: &str, params: &ResolverParams) -> Result<String, ResolveError> {
        self.get(name)?.resolve(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(cuid: &str) -> ResolverParams {
        ResolverParams {
            op: "format".into(),
            cuid: cuid.into(),
            msn: "01020304".into(),
            ..ResolverParams::default()
        }
    }

    fn config() -> ConfigStore {
        let base = "tokenProfileResolver.formatMappingResolver";
        ConfigStore::new()
            .with("tokenProfileResolver.list", "formatMappingResolver,fixed")
            .with(format!("{base}.class"), "org.dogtagpki.server.tps.mapping.MappingResolver")
            .with(format!("{base}.format.mapping.order"), "0,1,2")
            .with(format!("{base}.format.mapping.0.filter.tokenType"), "soKey")
            .with(format!("{base}.format.mapping.0.target.tokenType"), "soKey")
            .with(format!("{base}.format.mapping.1.filter.tokenCUID.start"), "a0000000000000000000")
            .with(format!("{base}.format.mapping.1.filter.tokenCUID.end"), "A0FFFFFFFFFFFFFFFFFF")
            .with(format!("{base}.format.mapping.1.filter.appletMajorVersion"), "1")
            .with(format!("{base}.format.mapping.1.target.tokenType"), "rangeKey")
            .with(format!("{base}.format.mapping.2.target.tokenType"), "tokenKey")
            .with("tokenProfileResolver.fixed.class", "FixedResolver")
            .with("tokenProfileResolver.fixed.tokenType", "fixedKey")
    }

    #[test]
    fn test_first_match_wins() {
        let registry = ResolverRegistry::from_config(&config()).unwrap();
        let name = "formatMappingResolver";

        let mut hinted = params("40906145C76224192D11");
        hinted.ext_token_type = Some("soKey".into());
        assert_eq!(registry.resolve(name, &hinted).unwrap(), "soKey");

        let mut in_range = params("A0906145C76224192D11");
        in_range.major_version = 1;
        assert_eq!(registry.resolve(name, &in_range).unwrap(), "rangeKey");

        // Same range, wrong applet version
        assert_eq!(registry.resolve(name, &params("A0906145C76224192D11")).unwrap(), "tokenKey");
        // Different length never matches a range
        let mut short = params("A090");
        short.major_version = 1;
        assert_eq!(registry.resolve(name, &short).unwrap(), "tokenKey");

        assert_eq!(registry.resolve("fixed", &hinted).unwrap(), "fixedKey");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let registry = ResolverRegistry::from_config(&config()).unwrap();
        let p = params("A0906145C76224192D11");
        assert_eq!(
            registry.resolve("formatMappingResolver", &p).unwrap(),
            registry.resolve("formatMappingResolver", &p).unwrap()
        );
    }

    #[test]
    fn test_errors() {
        let registry = ResolverRegistry::from_config(&config()).unwrap();
        assert!(matches!(
            registry.resolve("missing", &params("00")),
            Err(ResolveError::UnknownResolver(_))
        ));

        let mut enroll = params("00");
        enroll.op = "enroll".into();
        assert!(matches!(
            registry.resolve("formatMappingResolver", &enroll),
            Err(ResolveError::NoMatch { .. })
        ));

        let broken = config().with(
            "tokenProfileResolver.formatMappingResolver.format.mapping.0.filter.appletMajorVersion",
            "x",
        );
        assert!(matches!(
            ResolverRegistry::from_config(&broken),
            Err(ResolveError::Config(ConfigError::Invalid { .. }))
        ));
    }

    #[test]
    fn test_cuid_range_is_case_insensitive() {
        let range = CuidRange {
            start: Some("a0".into()),
            end: Some("af".into()),
        };
        assert!(range.contains("A5"));
        assert!(range.contains("a0"));
        assert!(range.contains("AF"));
        assert!(!range.contains("B0"));
        assert!(!range.contains("A"));
    }
}
