//! Token format workflow
//!
//! [`FormatProcessor`] drives one format operation over a token session:
//! it reads the card identity, resolves the token profile, authenticates the
//! operator, applies the profile policy, upgrades the applet to the version the
//! profile requires and writes issuer information. Outcomes are reported to the client
//! as [`TpsStatus`] codes.
//!
//! Everything the workflow needs beyond the session lives in a
//! [`FormatContext`].
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

// Only the tpsctl binary uses these
use clap as _;
use eyre as _;
use serde_json as _;
use tracing_subscriber as _;

pub mod context;
pub mod error;
pub mod identity;
pub mod processor;
pub mod settings;
pub mod state;
pub mod status;
pub mod upgrade;

pub use context::{FormatContext, MemoryDirectory, TokenDirectory};
pub use error::{Denial, Error, Failure, Result};
pub use identity::TokenIdentity;
pub use processor::{FormatProcessor, FormatReport};
pub use settings::{EffectiveSettings, FormatSettings};
pub use state::{Attempt, FormatState};
pub use status::TpsStatus;
