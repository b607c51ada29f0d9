//! GlobalPlatform card management for token formatting
//!
//! This crate provides the card side of applet provisioning:
//!
//! - plain builders for the card manager and token applet [`commands`]
//! - the SCP02 [`SecureChannel`], established through a remote
//!   [`KeyDerivationService`] by [`handshake::establish`]
//! - shared-secret unwrapping behind the [`KeyStore`] trait
//! - load file streaming for applet upgrades
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod commands;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod handshake;
pub mod kds;
pub mod keys;
pub mod load;
pub mod secure_channel;

pub use commands::{AppletStatus, CoolKeyCommand, GetDataCommand, SelectCommand};
pub use constants::SecurityLevel;
pub use error::{ChannelError, Result};
pub use handshake::{HandshakeParams, establish};
pub use kds::{KdsError, KeyDerivationService, RandomData, SessionKeyRequest, SessionKeyResponse};
pub use keys::{
    DEFAULT_SHARED_SECRET_NAME, INTERNAL_KEY_STORAGE_TOKEN, KeyStore, SharedSecretRef,
    SoftKeyStore, SymmetricKey,
};
pub use load::DEFAULT_BLOCK_SIZE;
pub use secure_channel::SecureChannel;
