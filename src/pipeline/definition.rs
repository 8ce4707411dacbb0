//! Ready-to-run pipeline definition

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::InstanceMode;

/// What a provider hands to the engine for one destination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineDefinition {
    pub destination: String,
    pub mode: InstanceMode,
    /// Where the definition came from (template path or manager address)
    pub source: String,
    /// Remote version for manager definitions
    pub version: Option<String>,
    pub properties: Map<String, Value>,
}

impl PipelineDefinition {
    /// String property, if present
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}
