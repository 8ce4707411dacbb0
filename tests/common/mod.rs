//! Shared fixtures: simulated cluster processes over one in-memory
//! coordination service.

#![allow(dead_code)]

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::runtime::Runtime;

use cdc_warden::config::{ElectionSettings, InstanceTable, ServerConfig};
use cdc_warden::controller::{Controller, ControllerParts};
use cdc_warden::coordination::{MemoryClient, MemoryCoordination};
use cdc_warden::manager::{ClientPool, ManagerAuth};
use cdc_warden::pipeline::{
    EmbeddedEngine, LocalDefinitionProvider, ManagerDefinitionProvider, ModeGenerator,
    PipelineEngine,
};

/// Release grace used by every fixture
pub const RELEASE_GRACE_MS: u64 = 200;

/// A conf dir holding the default definition template
pub fn conf_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("templates")).unwrap();
    fs::write(
        dir.path().join("templates/instance.json"),
        r#"{"instance": {"filter": ".*", "name": "${destination}"}}"#,
    )
    .unwrap();
    dir
}

/// Write `<conf_dir>/<destination>.json`
pub fn write_destination(dir: &TempDir, destination: &str, content: &str) {
    fs::write(dir.path().join(format!("{}.json", destination)), content).unwrap();
}

pub fn server_config(dir: &TempDir, ip: &str, destinations: &[&str]) -> ServerConfig {
    ServerConfig {
        ip: Some(ip.to_string()),
        destinations: destinations.iter().map(|d| d.to_string()).collect(),
        auto_scan: false,
        // Loops never tick on their own; tests tick by hand
        auto_scan_interval_secs: 3600,
        conf_dir: dir.path().to_path_buf(),
        election: ElectionSettings {
            release_grace_ms: RELEASE_GRACE_MS,
        },
        ..ServerConfig::default()
    }
}

/// One simulated process of the cluster
pub struct Node {
    pub controller: Controller,
    pub client: Arc<MemoryClient>,
    pub engine: Arc<EmbeddedEngine>,
}

/// Controller parts wired like the binary does, over a fresh session
pub fn parts(
    service: &MemoryCoordination,
    config: &ServerConfig,
    runtime: &Runtime,
) -> (ControllerParts, Arc<MemoryClient>, Arc<EmbeddedEngine>) {
    let client = service.connect();
    let configs = Arc::new(InstanceTable::new());
    let clients = Arc::new(ClientPool::http(ManagerAuth::default()));
    let generator = ModeGenerator::new(
        configs.clone(),
        Arc::new(LocalDefinitionProvider::new(config.conf_dir.clone())),
        Arc::new(ManagerDefinitionProvider::new(clients.clone())),
    );
    let engine = Arc::new(EmbeddedEngine::new(Arc::new(generator)));

    let parts = ControllerParts {
        client: client.clone(),
        engine: engine.clone(),
        forwarder: None,
        configs,
        clients,
        runtime: runtime.handle().clone(),
    };
    (parts, client, engine)
}

impl Node {
    pub fn build(service: &MemoryCoordination, config: &ServerConfig, runtime: &Runtime) -> Self {
        let (parts, client, engine) = parts(service, config, runtime);
        Self {
            controller: Controller::new(config, parts).unwrap(),
            client,
            engine,
        }
    }

    /// Build and start
    pub fn start(service: &MemoryCoordination, config: &ServerConfig, runtime: &Runtime) -> Self {
        let mut node = Self::build(service, config, runtime);
        node.controller.start().unwrap();
        node
    }

    pub fn address(&self) -> String {
        self.controller.identity().address().to_string()
    }

    pub fn is_active(&self, destination: &str) -> bool {
        self.controller
            .unit(destination)
            .is_some_and(|unit| unit.is_active())
    }

    pub fn is_running(&self, destination: &str) -> bool {
        self.engine.is_running(destination)
    }
}

pub fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}
