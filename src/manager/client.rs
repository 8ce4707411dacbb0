//! Remote configuration client capability

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{ManagerError, ManagerResult};

/// One destination's configuration as served by the manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteInstance {
    /// Pipeline properties (JSON object)
    pub content: Value,
    /// Opaque version; changes whenever the content changes
    pub version: String,
}

/// Client to one remote configuration manager
pub trait RemoteConfigClient: Send + Sync {
    /// Manager address this client talks to
    fn address(&self) -> &str;

    /// Destinations the manager assigns to this server.
    fn list_instances(&self) -> ManagerResult<Vec<String>>;

    /// Configuration of one destination.
    fn fetch_instance(&self, destination: &str) -> ManagerResult<RemoteInstance>;
}

/// Client serving a fixed, mutable set of instances from memory
pub struct StaticConfigClient {
    address: String,
    instances: RwLock<BTreeMap<String, RemoteInstance>>,
}

impl StaticConfigClient {
    /// Create an empty client for `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            instances: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add or replace an instance.
    pub fn put(&self, destination: &str, content: Value, version: &str) {
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                destination.to_string(),
                RemoteInstance {
                    content,
                    version: version.to_string(),
                },
            );
    }

    /// Remove an instance.
    pub fn remove(&self, destination: &str) {
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(destination);
    }
}

impl RemoteConfigClient for StaticConfigClient {
    fn address(&self) -> &str {
        &self.address
    }

    fn list_instances(&self) -> ManagerResult<Vec<String>> {
        Ok(self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }

    fn fetch_instance(&self, destination: &str) -> ManagerResult<RemoteInstance> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(destination)
            .cloned()
            .ok_or_else(|| ManagerError::NotFound(destination.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_static_client() {
        let client = StaticConfigClient::new("http://manager:8089");
        client.put("orders", json!({"db": "orders"}), "1");
        client.put("users", json!({}), "7");

        assert_eq!(client.list_instances().unwrap(), vec!["orders", "users"]);
        assert_eq!(client.fetch_instance("users").unwrap().version, "7");

        client.remove("orders");
        assert_eq!(
            client.fetch_instance("orders"),
            Err(ManagerError::NotFound("orders".to_string()))
        );
    }
}
