//! Server identity and leadership payload

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity this process advertises to the coordination service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    /// Advertised `host:port`
    address: String,
    /// Distinguishes restarts of a process on the same address
    process_id: Uuid,
}

impl ServerIdentity {
    /// Create an identity with a fresh process id.
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_process_id(address, Uuid::new_v4())
    }

    /// Create an identity with an explicit process id.
    pub fn with_process_id(address: impl Into<String>, process_id: Uuid) -> Self {
        Self {
            address: address.into(),
            process_id,
        }
    }

    /// Advertised address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Process id
    pub fn process_id(&self) -> Uuid {
        self.process_id
    }

    /// Payload of a leadership node written by this process.
    pub fn running_data(&self) -> RunningData {
        RunningData {
            address: self.address.clone(),
            process_id: self.process_id,
            active: true,
        }
    }

    /// Whether a leadership payload was written by this very process.
    pub fn owns(&self, payload: &[u8]) -> bool {
        RunningData::from_bytes(payload)
            .map(|data| data.process_id == self.process_id)
            .unwrap_or(false)
    }
}

/// Leadership node payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningData {
    /// Address of the holder
    pub address: String,
    /// Process id of the holder
    pub process_id: Uuid,
    /// Always true while the node exists
    pub active: bool,
}

impl RunningData {
    /// Serialize to the node payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Parse a node payload; `None` if it is not a leadership payload.
    pub fn from_bytes(payload: &[u8]) -> Option<Self> {
        serde_json::from_slice(payload).ok()
    }
}
