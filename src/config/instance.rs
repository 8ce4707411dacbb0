//! Per-destination instance configuration
//!
//! Two layers, resolved once per destination at load time:
//! 1. global defaults (`global` block, forced to manager mode when an admin
//!    manager is configured)
//! 2. per-destination overrides (`instances.<destination>`)
//!
//! The result is a fully resolved `InstanceConfig`; nothing is looked up
//! again later.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::{ConfigError, ConfigResult};

/// Placeholder substituted with the configured admin manager address
pub const ADMIN_MANAGER_PLACEHOLDER: &str = "${admin_manager}";

/// Default definition template, relative to the conf dir
pub const DEFAULT_DEFINITION: &str = "templates/instance.json";

/// Where a destination's pipeline definition comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceMode {
    /// Definition template files on local disk
    Local,
    /// Remote configuration manager
    Manager,
}

impl InstanceMode {
    /// Mode name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Manager => "manager",
        }
    }

    fn parse_for(value: &str, scope: &str) -> ConfigResult<Self> {
        value.parse().map_err(|_: ConfigError| ConfigError::UnsupportedMode {
            mode: value.to_string(),
            scope: scope.to_string(),
        })
    }
}

impl FromStr for InstanceMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "spring" => Ok(Self::Local),
            "manager" => Ok(Self::Manager),
            _ => Err(ConfigError::UnsupportedMode {
                mode: s.to_string(),
                scope: "mode".to_string(),
            }),
        }
    }
}

impl fmt::Display for InstanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional fields of the `global` and `instances.<destination>` blocks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lazy: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

/// Fully resolved configuration of one destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceConfig {
    pub mode: InstanceMode,
    /// Enter the election only on first external demand
    pub lazy: bool,
    /// Remote manager address (manager mode)
    pub manager_address: Option<String>,
    /// Definition template path (local mode)
    pub definition: String,
}

/// Resolves `InstanceConfig`s from the two configuration layers
#[derive(Debug, Clone)]
pub struct InstanceResolver {
    global: InstanceConfig,
    overrides: BTreeMap<String, InstanceOverrides>,
    admin_manager: Option<String>,
}

impl InstanceResolver {
    /// Resolve the global layer.
    pub fn new(
        global: &InstanceOverrides,
        overrides: BTreeMap<String, InstanceOverrides>,
        admin_manager: Option<String>,
    ) -> ConfigResult<Self> {
        let mode = match (&admin_manager, &global.mode) {
            (Some(_), _) => InstanceMode::Manager,
            (None, Some(mode)) => InstanceMode::parse_for(mode, "global")?,
            (None, None) => InstanceMode::Local,
        };

        let mut resolver = Self {
            global: InstanceConfig {
                mode,
                lazy: global.lazy.unwrap_or(false),
                manager_address: None,
                definition: global
                    .definition
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DEFINITION.to_string()),
            },
            overrides,
            admin_manager,
        };
        resolver.global.manager_address = resolver
            .substitute(global.manager_address.as_deref())
            .or_else(|| resolver.admin_manager.clone());
        Ok(resolver)
    }

    /// Global defaults
    pub fn global(&self) -> &InstanceConfig {
        &self.global
    }

    /// Resolve one destination: clone the global layer, apply overrides.
    pub fn resolve(&self, destination: &str) -> ConfigResult<InstanceConfig> {
        let mut config = self.global.clone();
        let Some(overrides) = self.overrides.get(destination) else {
            return self.checked(destination, config);
        };

        if self.admin_manager.is_some() {
            config.mode = InstanceMode::Manager;
        } else if let Some(mode) = &overrides.mode {
            config.mode = InstanceMode::parse_for(mode, destination)?;
        }

        if let Some(lazy) = overrides.lazy {
            config.lazy = lazy;
        }

        match config.mode {
            InstanceMode::Manager => {
                if let Some(address) = self.substitute(overrides.manager_address.as_deref()) {
                    config.manager_address = Some(address);
                }
            }
            InstanceMode::Local => {
                if let Some(definition) = &overrides.definition {
                    config.definition = definition.clone();
                }
            }
        }

        self.checked(destination, config)
    }

    fn checked(&self, destination: &str, config: InstanceConfig) -> ConfigResult<InstanceConfig> {
        if config.mode == InstanceMode::Manager && config.manager_address.is_none() {
            return Err(ConfigError::invalid(format!(
                "destination {} uses manager mode but no manager_address is configured",
                destination
            )));
        }
        Ok(config)
    }

    fn substitute(&self, value: Option<&str>) -> Option<String> {
        match value {
            Some(ADMIN_MANAGER_PLACEHOLDER) => self.admin_manager.clone(),
            Some(value) => Some(value.to_string()),
            None => None,
        }
    }
}
