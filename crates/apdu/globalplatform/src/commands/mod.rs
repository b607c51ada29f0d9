//! Card command builders
//!
//! Each builder returns a plain [`Command`](tps_apdu_core::Command); secure
//! messaging is applied by the [`SecureChannel`](crate::SecureChannel) for the
//! commands that need it.

pub mod coolkey;
pub mod delete;
pub mod external_authenticate;
pub mod get_data;
pub mod initialize_update;
pub mod install;
pub mod load;
pub mod select;

pub use coolkey::{AppletStatus, CoolKeyCommand};
pub use delete::DeleteCommand;
pub use external_authenticate::ExternalAuthenticateCommand;
pub use get_data::GetDataCommand;
pub use initialize_update::{InitializeUpdateCommand, InitializeUpdateOk};
pub use install::InstallCommand;
pub use load::LoadCommand;
pub use select::SelectCommand;
