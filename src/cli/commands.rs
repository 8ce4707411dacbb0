//! CLI command implementations
//!
//! `start` wires the standalone process: an in-process coordination
//! service, the embedded pipeline engine, the controller and the admin
//! front door, all sharing one tokio runtime.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::admin::AdminServer;
use crate::config::{InstanceConfig, InstanceTable, ServerConfig};
use crate::controller::{Controller, ControllerParts};
use crate::coordination::MemoryCoordination;
use crate::manager::{ClientPool, ManagerAuth};
use crate::pipeline::{
    EmbeddedEngine, LocalDefinitionProvider, ManagerDefinitionProvider, ModeGenerator,
};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::write_json;

/// Output of `check`
#[derive(Debug, Serialize)]
pub struct ResolvedConfig {
    pub address: String,
    pub auto_scan: bool,
    pub global: InstanceConfig,
    pub destinations: BTreeMap<String, InstanceConfig>,
}

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Start { config } => start(&config),
        Command::Check { config } => check(&config),
    }
}

/// Start the control plane and block until Ctrl-C.
pub fn start(config_path: &Path) -> CliResult<()> {
    let config = ServerConfig::load(config_path)?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    let coordination = MemoryCoordination::new();
    let configs = Arc::new(InstanceTable::new());
    let clients = Arc::new(ClientPool::http(ManagerAuth {
        ip: config.register_ip().to_string(),
        port: config.admin_port,
        user: config.admin_user.clone(),
        passwd: config.admin_passwd.clone(),
    }));
    let generator = ModeGenerator::new(
        configs.clone(),
        Arc::new(LocalDefinitionProvider::new(config.conf_dir.clone())),
        Arc::new(ManagerDefinitionProvider::new(clients.clone())),
    );

    let mut controller = Controller::new(
        &config,
        ControllerParts {
            client: coordination.connect(),
            engine: Arc::new(EmbeddedEngine::new(Arc::new(generator))),
            forwarder: None,
            configs,
            clients,
            runtime: runtime.handle().clone(),
        },
    )?;
    controller.set_front_door(Box::new(AdminServer::new(
        admin_addr(&config)?,
        runtime.handle().clone(),
    )));
    controller.start()?;

    let interrupted = runtime.block_on(tokio::signal::ctrl_c());
    controller.stop();
    interrupted.map_err(|e| CliError::io_error(format!("Failed to wait for Ctrl-C: {}", e)))
}

/// Validate the configuration and print what every destination resolves to.
pub fn check(config_path: &Path) -> CliResult<()> {
    let config = ServerConfig::load(config_path)?;
    write_json(&resolve_all(&config)?)
}

/// Resolve the global layer and every destination named in the config.
pub fn resolve_all(config: &ServerConfig) -> CliResult<ResolvedConfig> {
    let resolver = config.resolver()?;
    let mut destinations = BTreeMap::new();
    for destination in config.destinations.iter().chain(config.instances.keys()) {
        destinations.insert(destination.clone(), resolver.resolve(destination)?);
    }

    Ok(ResolvedConfig {
        address: config.advertised_address(),
        auto_scan: config.auto_scan,
        global: resolver.global().clone(),
        destinations,
    })
}

fn admin_addr(config: &ServerConfig) -> CliResult<SocketAddr> {
    let ip = match config.ip.as_deref().filter(|ip| !ip.trim().is_empty()) {
        Some(ip) => ip
            .parse::<IpAddr>()
            .map_err(|e| CliError::config_error(format!("invalid ip {:?}: {}", ip, e)))?,
        None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    };
    Ok(SocketAddr::new(ip, config.admin_port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InstanceMode, InstanceOverrides};

    #[test]
    fn test_resolve_all_covers_listed_and_overridden() {
        let mut config = ServerConfig {
            destinations: vec!["orders".to_string()],
            ..ServerConfig::default()
        };
        config.instances.insert(
            "users".to_string(),
            InstanceOverrides {
                lazy: Some(true),
                ..InstanceOverrides::default()
            },
        );

        let resolved = resolve_all(&config).unwrap();
        assert_eq!(resolved.address, "127.0.0.1:11111");
        assert_eq!(resolved.global.mode, InstanceMode::Local);
        assert!(!resolved.destinations["orders"].lazy);
        assert!(resolved.destinations["users"].lazy);
    }

    #[test]
    fn test_admin_addr() {
        let config = ServerConfig::default();
        assert_eq!(admin_addr(&config).unwrap().to_string(), "0.0.0.0:11110");

        let config = ServerConfig {
            ip: Some("10.0.0.5".to_string()),
            ..ServerConfig::default()
        };
        assert_eq!(admin_addr(&config).unwrap().to_string(), "10.0.0.5:11110");

        let config = ServerConfig {
            ip: Some("not-an-ip".to_string()),
            ..ServerConfig::default()
        };
        assert!(admin_addr(&config).is_err());
    }
}
