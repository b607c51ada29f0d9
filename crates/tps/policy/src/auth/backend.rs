//! Credential checking backends

use std::{collections::BTreeMap, fmt, sync::Arc};

use sha2::{Digest, Sha256};
use tracing::debug;

use super::{AuthError, AuthToken, Credentials};
use crate::config::ConfigStore;

/// Externally provided credential check, e.g. a directory bind
pub trait ExternalAuth: Send + Sync + fmt::Debug {
    /// Check credentials and describe the user
    fn authenticate(&self, credentials: &Credentials) -> Result<AuthToken, AuthError>;
}

/// Users with SHA-256 password digests
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PasswordTable {
    /// Credential naming the user
    pub user_cred: String,
    /// Credential holding the password
    pub password_cred: String,
    /// Lower-case hex SHA-256 digest per user
    pub users: BTreeMap<String, String>,
}

impl fmt::Debug for PasswordTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordTable")
            .field("user_cred", &self.user_cred)
            .field("password_cred", &self.password_cred)
            .field("users", &self.users.keys())
            .finish()
    }
}

impl PasswordTable {
    /// Read `<prefix>.users.<uid>=<digest>` entries
    pub fn from_config(config: &ConfigStore, prefix: &str) -> Self {
        let users_prefix = format!("{prefix}.users");
        let users = config
            .children(&users_prefix)
            .into_iter()
            .filter_map(|user| {
                let digest = config
                    .get_str(&format!("{users_prefix}.{user}"))?
                    .to_ascii_lowercase();
                Some((user, digest))
            })
            .collect();
        Self {
            user_cred: config.get_string_or(&format!("{prefix}.authCredName"), "uid"),
            password_cred: config.get_string_or(&format!("{prefix}.passwordCredName"), "pwd"),
            users,
        }
    }

    /// Hex digest of a password
    pub fn digest(password: &str) -> String {
        hex::encode(Sha256::digest(password.as_bytes()))
    }

    fn authenticate(&self, credentials: &Credentials) -> Result<AuthToken, AuthError> {
        let user = credentials.require(&self.user_cred)?;
        let password = credentials.require(&self.password_cred)?;
        match self.users.get(user) {
            Some(expected) if *expected == Self::digest(password) => Ok(AuthToken::for_user(user)),
            _ => {
                debug!(user, "Password check failed");
                Err(AuthError::InvalidCredentials(user.to_string()))
            }
        }
    }
}

/// Credential checking backend
#[derive(Debug, Clone)]
pub enum AuthBackend {
    /// Configured password digests
    PasswordTable(PasswordTable),
    /// Injected collaborator
    External(Arc<dyn ExternalAuth>),
}

impl AuthBackend {
    /// Check credentials
    pub fn authenticate(&self, credentials: &Credentials) -> Result<AuthToken, AuthError> {
        match self {
            Self::PasswordTable(table) => table.authenticate(credentials),
            Self::External(backend) => backend.authenticate(credentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PasswordTable {
        let config = ConfigStore::new().with(
            "auths.instance.local.users.jdoe",
            PasswordTable::digest("secret").to_uppercase(),
        );
        PasswordTable::from_config(&config, "auths.instance.local")
    }

    #[test]
    fn test_password_table() {
        let backend = AuthBackend::PasswordTable(table());
        let mut credentials = Credentials::new();
        credentials.insert("uid", "jdoe");
        credentials.insert("pwd", "secret");
        let token = backend.authenticate(&credentials).unwrap();
        assert_eq!(token.user_id(), Some("jdoe"));

        credentials.insert("pwd", "wrong");
        assert!(matches!(
            backend.authenticate(&credentials),
            Err(AuthError::InvalidCredentials(_))
        ));

        let mut partial = Credentials::new();
        partial.insert("uid", "jdoe");
        assert!(matches!(
            backend.authenticate(&partial),
            Err(AuthError::MissingCredential(name)) if name == "pwd"
        ));
    }

    #[test]
    fn test_digest() {
        assert_eq!(
            PasswordTable::digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_debug_hides_digests() {
        assert!(!format!("{:?}", table()).contains(&PasswordTable::digest("secret")));
    }
}
