//! Server configuration file
//!
//! Loaded from JSON (`./cdc-warden.json` by default). Precedence:
//! environment (`CDC_WARDEN_*`) > file > built-in default.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::errors::{ConfigError, ConfigResult};
use super::instance::{InstanceOverrides, InstanceResolver};

/// Election tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSettings {
    /// Wait between releasing leadership and re-entering the race
    #[serde(default = "default_release_grace_ms")]
    pub release_grace_ms: u64,
}

impl Default for ElectionSettings {
    fn default() -> Self {
        Self {
            release_grace_ms: default_release_grace_ms(),
        }
    }
}

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address of this server
    #[serde(default)]
    pub ip: Option<String>,

    /// Address advertised to the cluster (falls back to `ip`)
    #[serde(default)]
    pub register_ip: Option<String>,

    /// Pipeline service port, part of the advertised identity
    #[serde(default = "default_port")]
    pub port: u16,

    /// Admin front door port
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,

    #[serde(default)]
    pub admin_user: Option<String>,

    #[serde(default)]
    pub admin_passwd: Option<String>,

    /// Destinations known at boot
    #[serde(default)]
    pub destinations: Vec<String>,

    /// Run config monitors
    #[serde(default = "default_auto_scan")]
    pub auto_scan: bool,

    #[serde(default = "default_auto_scan_interval")]
    pub auto_scan_interval_secs: u64,

    /// Root of per-destination config files and definition templates
    #[serde(default = "default_conf_dir")]
    pub conf_dir: PathBuf,

    /// Remote manager address; forces manager mode for every destination
    #[serde(default)]
    pub admin_manager: Option<String>,

    #[serde(default)]
    pub global: InstanceOverrides,

    #[serde(default)]
    pub instances: BTreeMap<String, InstanceOverrides>,

    #[serde(default)]
    pub election: ElectionSettings,
}

fn default_port() -> u16 {
    11111
}
fn default_admin_port() -> u16 {
    11110
}
fn default_auto_scan() -> bool {
    true
}
fn default_auto_scan_interval() -> u64 {
    5
}
fn default_conf_dir() -> PathBuf {
    PathBuf::from("../conf")
}
fn default_release_grace_ms() -> u64 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: None,
            register_ip: None,
            port: default_port(),
            admin_port: default_admin_port(),
            admin_user: None,
            admin_passwd: None,
            destinations: Vec::new(),
            auto_scan: default_auto_scan(),
            auto_scan_interval_secs: default_auto_scan_interval(),
            conf_dir: default_conf_dir(),
            admin_manager: None,
            global: InstanceOverrides::default(),
            instances: BTreeMap::new(),
            election: ElectionSettings::default(),
        }
    }
}

/// Whether a name can be used as a destination (path segment, file stem).
pub fn is_valid_destination(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]{0,127}$").expect("destination pattern is valid")
        })
        .is_match(name)
}

impl ServerConfig {
    /// Load configuration from file, apply environment overrides, validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_json_str(&content)?
            .with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Parse and validate a JSON document without environment overrides.
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let config: ServerConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CDC_WARDEN_*` overrides from `lookup`, then re-validate.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ip) = lookup("CDC_WARDEN_IP") {
            self.ip = Some(ip);
        }
        if let Some(register_ip) = lookup("CDC_WARDEN_REGISTER_IP") {
            self.register_ip = Some(register_ip);
        }
        if let Some(port) = lookup("CDC_WARDEN_PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(format!("CDC_WARDEN_PORT: '{}' is not a port", port)))?;
        }
        if let Some(destinations) = lookup("CDC_WARDEN_DESTINATIONS") {
            self.destinations = destinations
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(auto_scan) = lookup("CDC_WARDEN_AUTO_SCAN") {
            self.auto_scan = auto_scan.trim().parse().map_err(|_| {
                ConfigError::invalid(format!("CDC_WARDEN_AUTO_SCAN: '{}' is not a boolean", auto_scan))
            })?;
        }
        if let Some(interval) = lookup("CDC_WARDEN_AUTO_SCAN_INTERVAL") {
            self.auto_scan_interval_secs = interval.trim().parse().map_err(|_| {
                ConfigError::invalid(format!(
                    "CDC_WARDEN_AUTO_SCAN_INTERVAL: '{}' is not a number of seconds",
                    interval
                ))
            })?;
        }
        if let Some(conf_dir) = lookup("CDC_WARDEN_CONF_DIR") {
            self.conf_dir = PathBuf::from(conf_dir);
        }
        if let Some(admin_manager) = lookup("CDC_WARDEN_ADMIN_MANAGER") {
            self.admin_manager = Some(admin_manager).filter(|a| !a.trim().is_empty());
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate field values.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.port == 0 {
            return Err(ConfigError::invalid("port must be > 0"));
        }

        if self.auto_scan_interval_secs == 0 {
            return Err(ConfigError::invalid("auto_scan_interval_secs must be > 0"));
        }

        if let Some(admin_manager) = &self.admin_manager {
            if admin_manager.trim().is_empty() {
                return Err(ConfigError::invalid("admin_manager must not be empty"));
            }
        }

        for destination in self.destinations.iter().chain(self.instances.keys()) {
            if !is_valid_destination(destination) {
                return Err(ConfigError::invalid(format!(
                    "invalid destination name: '{}'",
                    destination
                )));
            }
        }

        Ok(())
    }

    /// Address advertised to peers: `register_ip` → `ip` → loopback.
    pub fn register_ip(&self) -> &str {
        self.register_ip
            .as_deref()
            .or(self.ip.as_deref())
            .filter(|ip| !ip.trim().is_empty())
            .unwrap_or("127.0.0.1")
    }

    /// `register_ip:port`
    pub fn advertised_address(&self) -> String {
        format!("{}:{}", self.register_ip(), self.port)
    }

    /// Build the two-layer instance config resolver.
    pub fn resolver(&self) -> ConfigResult<InstanceResolver> {
        InstanceResolver::new(
            &self.global,
            self.instances.clone(),
            self.admin_manager.clone(),
        )
    }

    /// Reconciliation interval
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.auto_scan_interval_secs)
    }

    /// Release grace period
    pub fn release_grace(&self) -> Duration {
        Duration::from_millis(self.election.release_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_json_str("{}").unwrap();
        assert_eq!(config.port, 11111);
        assert_eq!(config.admin_port, 11110);
        assert!(config.auto_scan);
        assert_eq!(config.scan_interval(), Duration::from_secs(5));
        assert_eq!(config.conf_dir, PathBuf::from("../conf"));
        assert_eq!(config.release_grace(), Duration::from_millis(5000));
        assert_eq!(config.advertised_address(), "127.0.0.1:11111");
    }

    #[test]
    fn test_register_ip_falls_back_to_ip() {
        let config = ServerConfig::from_json_str(r#"{"ip": "10.0.0.5", "port": 2222}"#).unwrap();
        assert_eq!(config.advertised_address(), "10.0.0.5:2222");

        let config =
            ServerConfig::from_json_str(r#"{"ip": "10.0.0.5", "register_ip": "1.2.3.4"}"#).unwrap();
        assert_eq!(config.register_ip(), "1.2.3.4");
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        let env: HashMap<&str, &str> = [
            ("CDC_WARDEN_PORT", "3333"),
            ("CDC_WARDEN_DESTINATIONS", "orders, users,,"),
            ("CDC_WARDEN_AUTO_SCAN", "false"),
        ]
        .into_iter()
        .collect();

        let config = ServerConfig::from_json_str(r#"{"port": 2222, "destinations": ["x"]}"#)
            .unwrap()
            .with_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.port, 3333);
        assert_eq!(config.destinations, vec!["orders", "users"]);
        assert!(!config.auto_scan);
    }

    #[test]
    fn test_bad_env_value_is_rejected() {
        let result = ServerConfig::default().with_env_overrides(|key| {
            (key == "CDC_WARDEN_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_values() {
        assert!(ServerConfig::from_json_str(r#"{"port": 0}"#).is_err());
        assert!(ServerConfig::from_json_str(r#"{"auto_scan_interval_secs": 0}"#).is_err());
        assert!(ServerConfig::from_json_str(r#"{"destinations": ["../etc"]}"#).is_err());
        assert!(matches!(
            ServerConfig::from_json_str("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_destination_names() {
        assert!(is_valid_destination("orders"));
        assert!(is_valid_destination("orders_v2.eu-1"));
        assert!(!is_valid_destination(""));
        assert!(!is_valid_destination(".hidden"));
        assert!(!is_valid_destination("a/b"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"destinations": ["orders"], "instances": {{"orders": {{"lazy": true}}}}}}"#
        )
        .unwrap();

        let config = ServerConfig::from_json_str(&fs::read_to_string(file.path()).unwrap()).unwrap();
        let resolver = config.resolver().unwrap();
        assert!(resolver.resolve("orders").unwrap().lazy);

        let missing = ServerConfig::load(Path::new("/nonexistent/cdc-warden.json"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
