//! Pipeline definition providers
//!
//! `ModeGenerator` looks up a destination's resolved instance config and
//! hands it to the provider for its mode:
//! - `LocalDefinitionProvider`: named templates in a JSON file under the
//!   conf dir, overlaid with `<conf_dir>/<destination>.json`
//! - `ManagerDefinitionProvider`: the remote manager at the config's
//!   `manager_address`

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::definition::PipelineDefinition;
use super::errors::{PipelineError, PipelineResult};
use crate::config::{InstanceConfig, InstanceMode, InstanceTable};
use crate::manager::ClientPool;

/// Template used when none is named after the destination
pub const DEFAULT_TEMPLATE: &str = "instance";

/// Placeholder in template string values replaced by the destination name
pub const DESTINATION_PLACEHOLDER: &str = "${destination}";

/// Produces a ready-to-run definition for a destination
pub trait InstanceGenerator: Send + Sync {
    fn generate(&self, destination: &str) -> PipelineResult<PipelineDefinition>;
}

/// One way of turning an `InstanceConfig` into a definition
pub trait DefinitionProvider: Send + Sync {
    fn provide(&self, destination: &str, config: &InstanceConfig) -> PipelineResult<PipelineDefinition>;
}

// =============================================================================
// MODE DISPATCH
// =============================================================================

/// Dispatches to the provider matching the destination's mode
pub struct ModeGenerator {
    table: Arc<InstanceTable>,
    local: Arc<dyn DefinitionProvider>,
    manager: Arc<dyn DefinitionProvider>,
}

impl ModeGenerator {
    pub fn new(
        table: Arc<InstanceTable>,
        local: Arc<dyn DefinitionProvider>,
        manager: Arc<dyn DefinitionProvider>,
    ) -> Self {
        Self {
            table,
            local,
            manager,
        }
    }
}

impl InstanceGenerator for ModeGenerator {
    fn generate(&self, destination: &str) -> PipelineResult<PipelineDefinition> {
        let config = self
            .table
            .get(destination)
            .ok_or_else(|| PipelineError::UnknownDestination(destination.to_string()))?;

        match config.mode {
            InstanceMode::Local => self.local.provide(destination, &config),
            InstanceMode::Manager => self.manager.provide(destination, &config),
        }
    }
}

// =============================================================================
// LOCAL
// =============================================================================

/// Definitions from template files on local disk
pub struct LocalDefinitionProvider {
    conf_dir: PathBuf,
}

impl LocalDefinitionProvider {
    pub fn new(conf_dir: impl Into<PathBuf>) -> Self {
        Self {
            conf_dir: conf_dir.into(),
        }
    }

    fn read_object(&self, destination: &str, path: &Path) -> PipelineResult<Map<String, Value>> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::definition(destination, format!("{}: {}", path.display(), e))
        })?;
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(PipelineError::definition(
                destination,
                format!("{}: expected a JSON object", path.display()),
            )),
            Err(e) => Err(PipelineError::definition(
                destination,
                format!("{}: {}", path.display(), e),
            )),
        }
    }
}

impl DefinitionProvider for LocalDefinitionProvider {
    fn provide(&self, destination: &str, config: &InstanceConfig) -> PipelineResult<PipelineDefinition> {
        let template_path = self.conf_dir.join(&config.definition);
        let mut templates = self.read_object(destination, &template_path)?;

        let template = templates
            .remove(destination)
            .or_else(|| templates.remove(DEFAULT_TEMPLATE))
            .ok_or_else(|| {
                PipelineError::definition(
                    destination,
                    format!(
                        "{} has neither a '{}' nor a '{}' template",
                        template_path.display(),
                        destination,
                        DEFAULT_TEMPLATE
                    ),
                )
            })?;

        let mut properties = match template {
            Value::Object(map) => map,
            _ => {
                return Err(PipelineError::definition(
                    destination,
                    "template must be a JSON object",
                ))
            }
        };

        let overlay_path = self.conf_dir.join(format!("{}.json", destination));
        if overlay_path.is_file() {
            properties.extend(self.read_object(destination, &overlay_path)?);
        }

        Ok(PipelineDefinition {
            destination: destination.to_string(),
            mode: InstanceMode::Local,
            source: template_path.display().to_string(),
            version: None,
            properties: substitute_destination(properties, destination),
        })
    }
}

fn substitute_destination(properties: Map<String, Value>, destination: &str) -> Map<String, Value> {
    properties
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => (key, Value::String(s.replace(DESTINATION_PLACEHOLDER, destination))),
            other => (key, other),
        })
        .collect()
}

// =============================================================================
// MANAGER
// =============================================================================

/// Definitions served by a remote manager
pub struct ManagerDefinitionProvider {
    pool: Arc<ClientPool>,
}

impl ManagerDefinitionProvider {
    pub fn new(pool: Arc<ClientPool>) -> Self {
        Self { pool }
    }
}

impl DefinitionProvider for ManagerDefinitionProvider {
    fn provide(&self, destination: &str, config: &InstanceConfig) -> PipelineResult<PipelineDefinition> {
        let address = config
            .manager_address
            .as_deref()
            .ok_or_else(|| PipelineError::definition(destination, "no manager_address configured"))?;

        let client = self
            .pool
            .client(address)
            .map_err(|e| PipelineError::definition(destination, e.to_string()))?;
        let instance = client
            .fetch_instance(destination)
            .map_err(|e| PipelineError::definition(destination, e.to_string()))?;

        let properties = match instance.content {
            Value::Object(map) => map,
            _ => {
                return Err(PipelineError::definition(
                    destination,
                    "manager content must be a JSON object",
                ))
            }
        };

        Ok(PipelineDefinition {
            destination: destination.to_string(),
            mode: InstanceMode::Manager,
            source: address.to_string(),
            version: Some(instance.version),
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{RemoteConfigClient, StaticConfigClient};
    use serde_json::json;
    use tempfile::TempDir;

    fn local_config() -> InstanceConfig {
        InstanceConfig {
            mode: InstanceMode::Local,
            lazy: false,
            manager_address: None,
            definition: "templates/instance.json".to_string(),
        }
    }

    fn write_templates(dir: &TempDir, templates: Value) {
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        fs::write(
            dir.path().join("templates/instance.json"),
            templates.to_string(),
        )
        .unwrap();
    }

    #[test]
    fn test_default_template_with_overlay() {
        let dir = TempDir::new().unwrap();
        write_templates(
            &dir,
            json!({"instance": {"filter": ".*", "name": "${destination}-pipeline"}}),
        );
        fs::write(dir.path().join("orders.json"), r#"{"filter": "orders\\..*"}"#).unwrap();

        let provider = LocalDefinitionProvider::new(dir.path());
        let definition = provider.provide("orders", &local_config()).unwrap();

        assert_eq!(definition.property("filter"), Some("orders\\..*"));
        assert_eq!(definition.property("name"), Some("orders-pipeline"));
        assert_eq!(definition.mode, InstanceMode::Local);
    }

    #[test]
    fn test_destination_named_template_wins() {
        let dir = TempDir::new().unwrap();
        write_templates(
            &dir,
            json!({"instance": {"kind": "default"}, "orders": {"kind": "orders"}}),
        );

        let provider = LocalDefinitionProvider::new(dir.path());
        assert_eq!(
            provider.provide("orders", &local_config()).unwrap().property("kind"),
            Some("orders")
        );
        assert_eq!(
            provider.provide("users", &local_config()).unwrap().property("kind"),
            Some("default")
        );
    }

    #[test]
    fn test_missing_template_is_a_definition_error() {
        let dir = TempDir::new().unwrap();
        let provider = LocalDefinitionProvider::new(dir.path());
        assert!(matches!(
            provider.provide("orders", &local_config()),
            Err(PipelineError::Definition { .. })
        ));

        write_templates(&dir, json!({"other": {}}));
        assert!(matches!(
            provider.provide("orders", &local_config()),
            Err(PipelineError::Definition { .. })
        ));
    }

    #[test]
    fn test_mode_generator_dispatch() {
        let dir = TempDir::new().unwrap();
        write_templates(&dir, json!({"instance": {"kind": "local"}}));

        let remote = Arc::new(StaticConfigClient::new("m1:8089"));
        remote.put("users", json!({"kind": "remote"}), "4");
        let shared = remote.clone();
        let pool = Arc::new(ClientPool::new(Box::new(move |_address: &str| {
            Ok(shared.clone() as Arc<dyn RemoteConfigClient>)
        })));

        let table = Arc::new(InstanceTable::new());
        table.insert("orders", local_config());
        table.insert(
            "users",
            InstanceConfig {
                mode: InstanceMode::Manager,
                manager_address: Some("m1:8089".to_string()),
                ..local_config()
            },
        );

        let generator = ModeGenerator::new(
            table,
            Arc::new(LocalDefinitionProvider::new(dir.path())),
            Arc::new(ManagerDefinitionProvider::new(pool)),
        );

        assert_eq!(generator.generate("orders").unwrap().property("kind"), Some("local"));
        let users = generator.generate("users").unwrap();
        assert_eq!(users.property("kind"), Some("remote"));
        assert_eq!(users.version.as_deref(), Some("4"));
        assert_eq!(
            generator.generate("ghost"),
            Err(PipelineError::UnknownDestination("ghost".to_string()))
        );
    }
}
