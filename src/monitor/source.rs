//! Configuration sources
//!
//! A source answers two questions for a config monitor: which destinations
//! are desired right now, and what is the fingerprint of each one's
//! configuration.
//! - `FileScanSource`: `<conf_dir>/<destination>.json` files, fingerprint
//!   `mtime_ms:sha256`
//! - `RemotePollSource`: a remote manager, fingerprint = remote version

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

use super::errors::{MonitorError, MonitorResult};
use super::reconcile::Fingerprint;
use crate::config::is_valid_destination;
use crate::manager::ClientPool;

/// Where a monitor reads the desired configuration from
pub trait ConfigSource: Send + Sync {
    /// Short name for observability
    fn kind(&self) -> &'static str;

    /// Destinations currently desired
    fn destinations(&self) -> MonitorResult<BTreeSet<String>>;

    /// Fingerprint of one destination's configuration
    fn fingerprint(&self, destination: &str) -> MonitorResult<Fingerprint>;
}

// =============================================================================
// FILE SCAN
// =============================================================================

/// Destination config files directly under a directory
pub struct FileScanSource {
    conf_dir: PathBuf,
}

impl FileScanSource {
    pub fn new(conf_dir: impl Into<PathBuf>) -> Self {
        Self {
            conf_dir: conf_dir.into(),
        }
    }

    /// Config file of one destination
    pub fn path_for(&self, destination: &str) -> PathBuf {
        self.conf_dir.join(format!("{}.json", destination))
    }
}

fn io_error(path: &Path, error: std::io::Error) -> MonitorError {
    MonitorError::Io {
        path: path.display().to_string(),
        reason: error.to_string(),
    }
}

impl ConfigSource for FileScanSource {
    fn kind(&self) -> &'static str {
        "file-scan"
    }

    fn destinations(&self) -> MonitorResult<BTreeSet<String>> {
        let entries = fs::read_dir(&self.conf_dir).map_err(|e| io_error(&self.conf_dir, e))?;

        let mut destinations = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error(&self.conf_dir, e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                // Hidden files fail the name check too
                if is_valid_destination(stem) {
                    destinations.insert(stem.to_string());
                }
            }
        }
        Ok(destinations)
    }

    fn fingerprint(&self, destination: &str) -> MonitorResult<Fingerprint> {
        let path = self.path_for(destination);
        let metadata = fs::metadata(&path).map_err(|e| io_error(&path, e))?;
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis())
            .unwrap_or(0);

        let content = fs::read(&path).map_err(|e| io_error(&path, e))?;
        let digest = Sha256::digest(&content);
        let hash: String = digest.iter().map(|b| format!("{:02x}", b)).collect();

        Ok(format!("{}:{}", modified_ms, hash))
    }
}

// =============================================================================
// REMOTE POLL
// =============================================================================

/// Destinations served by a remote manager
///
/// The client comes from a shared pool, so every source and provider
/// pointed at one address shares one connection.
pub struct RemotePollSource {
    pool: Arc<ClientPool>,
    address: String,
}

impl RemotePollSource {
    pub fn new(pool: Arc<ClientPool>, address: impl Into<String>) -> Self {
        Self {
            pool,
            address: address.into(),
        }
    }

    /// Manager address polled
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl ConfigSource for RemotePollSource {
    fn kind(&self) -> &'static str {
        "remote-poll"
    }

    fn destinations(&self) -> MonitorResult<BTreeSet<String>> {
        let client = self.pool.client(&self.address)?;
        Ok(client
            .list_instances()?
            .into_iter()
            .filter(|d| is_valid_destination(d))
            .collect())
    }

    fn fingerprint(&self, destination: &str) -> MonitorResult<Fingerprint> {
        let client = self.pool.client(&self.address)?;
        Ok(client.fetch_instance(destination)?.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{RemoteConfigClient, StaticConfigClient};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_file_scan_lists_json_files_only() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("orders.json"), "{}").unwrap();
        fs::write(dir.path().join("users.json"), "{}").unwrap();
        fs::write(dir.path().join(".hidden.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir(dir.path().join("templates.json")).unwrap();

        let source = FileScanSource::new(dir.path());
        let destinations: Vec<String> = source.destinations().unwrap().into_iter().collect();
        assert_eq!(destinations, vec!["orders", "users"]);
    }

    #[test]
    fn test_file_fingerprint_tracks_content() {
        let dir = TempDir::new().unwrap();
        let source = FileScanSource::new(dir.path());
        fs::write(source.path_for("orders"), r#"{"a": 1}"#).unwrap();

        let first = source.fingerprint("orders").unwrap();
        assert_eq!(first, source.fingerprint("orders").unwrap());

        fs::write(source.path_for("orders"), r#"{"a": 2}"#).unwrap();
        assert_ne!(first, source.fingerprint("orders").unwrap());

        assert!(source.fingerprint("missing").is_err());
    }

    #[test]
    fn test_missing_conf_dir_is_an_error() {
        let source = FileScanSource::new("/nonexistent/cdc-warden/conf");
        assert!(matches!(source.destinations(), Err(MonitorError::Io { .. })));
    }

    #[test]
    fn test_remote_poll_uses_versions() {
        let remote = Arc::new(StaticConfigClient::new("m1:8089"));
        remote.put("orders", json!({}), "3");
        let shared = remote.clone();
        let pool = Arc::new(ClientPool::new(Box::new(move |_address: &str| {
            Ok(shared.clone() as Arc<dyn RemoteConfigClient>)
        })));

        let source = RemotePollSource::new(pool, "m1:8089");
        assert_eq!(source.destinations().unwrap().len(), 1);
        assert_eq!(source.fingerprint("orders").unwrap(), "3");
        assert!(source.fingerprint("users").is_err());
    }
}
