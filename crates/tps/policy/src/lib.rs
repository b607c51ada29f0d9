//! Policy decisions for token formatting
//!
//! - [`config`]: the flat configuration store every decision reads from
//! - [`resolver`]: token profile resolution by named resolver instances
//! - [`auth`]: operator authentication over the token session
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod auth;
pub mod config;
pub mod resolver;

pub use auth::{AuthError, AuthToken, Authenticator, AuthenticatorRegistry, Credentials};
pub use config::{ConfigError, ConfigStore};
pub use resolver::{NO_RESOLVER, ResolveError, Resolver, ResolverParams, ResolverRegistry};
