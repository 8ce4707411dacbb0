//! Remote configuration manager
//!
//! Manager-mode destinations get their configuration from a remote manager
//! over HTTP. Clients are pooled by manager address.

mod client;
mod errors;
mod http;
mod pool;

pub use client::{RemoteConfigClient, RemoteInstance, StaticConfigClient};
pub use errors::{ManagerError, ManagerResult};
pub use http::{HttpConfigClient, ManagerAuth};
pub use pool::{ClientFactory, ClientPool};
