//! Configuration subsystem
//!
//! - `ServerConfig`: the JSON configuration file plus environment overrides
//! - `InstanceResolver`: global defaults overlaid with per-destination
//!   overrides, resolved once per destination
//! - `InstanceTable`: the resolved configs the controller owns

mod errors;
mod instance;
mod server;
mod table;

pub use errors::{ConfigError, ConfigResult};
pub use instance::{
    InstanceConfig, InstanceMode, InstanceOverrides, InstanceResolver, ADMIN_MANAGER_PLACEHOLDER,
    DEFAULT_DEFINITION,
};
pub use server::{is_valid_destination, ElectionSettings, ServerConfig};
pub use table::InstanceTable;
