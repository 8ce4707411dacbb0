//! Config monitor reconciliation against real sources

mod common;

use std::collections::BTreeSet;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use cdc_warden::config::InstanceMode;
use cdc_warden::coordination::MemoryCoordination;
use cdc_warden::lifecycle::{ActionResult, LifecycleActions};
use cdc_warden::manager::{ClientPool, RemoteConfigClient, StaticConfigClient};
use cdc_warden::monitor::{
    ConfigMonitor, ConfigSource, FileScanSource, RemotePollSource, ScanMonitor,
};

use common::{conf_dir, runtime, server_config, write_destination, Node};

#[derive(Default)]
struct RecordingActions {
    calls: Mutex<Vec<String>>,
}

impl RecordingActions {
    fn take(&self) -> BTreeSet<String> {
        self.calls.lock().unwrap().drain(..).collect()
    }

    fn record(&self, action: &str, destination: &str) -> ActionResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}", action, destination));
        Ok(())
    }
}

impl LifecycleActions for RecordingActions {
    fn start(&self, destination: &str) -> ActionResult<()> {
        self.record("start", destination)
    }
    fn stop(&self, destination: &str) -> ActionResult<()> {
        self.record("stop", destination)
    }
    fn reload(&self, destination: &str) -> ActionResult<()> {
        self.record("reload", destination)
    }
    fn release(&self, destination: &str) -> ActionResult<()> {
        self.record("release", destination)
    }
}

fn calls(expected: &[&str]) -> BTreeSet<String> {
    expected.iter().map(|c| c.to_string()).collect()
}

fn file_monitor(
    dir: &TempDir,
    rt: &tokio::runtime::Runtime,
    actions: &Arc<RecordingActions>,
) -> Arc<ScanMonitor<FileScanSource>> {
    let monitor = ScanMonitor::new(
        InstanceMode::Local,
        FileScanSource::new(dir.path()),
        Duration::from_secs(3600),
        rt.handle().clone(),
    );
    monitor.set_default_actions(actions.clone());
    monitor
}

#[test]
fn test_tick_diffs_desired_against_known() {
    let rt = runtime();
    let dir = TempDir::new().unwrap();
    let actions = Arc::new(RecordingActions::default());
    let monitor = file_monitor(&dir, &rt, &actions);

    // Known: {B, C}
    fs::write(dir.path().join("b.json"), r#"{"v": 1}"#).unwrap();
    fs::write(dir.path().join("c.json"), r#"{"v": 1}"#).unwrap();
    monitor.tick().unwrap();
    assert_eq!(actions.take(), calls(&["start:b", "start:c"]));

    // Desired: {A, B}, B unchanged
    fs::write(dir.path().join("a.json"), r#"{"v": 1}"#).unwrap();
    fs::remove_file(dir.path().join("c.json")).unwrap();
    let report = monitor.tick().unwrap();
    assert_eq!(actions.take(), calls(&["start:a", "stop:c"]));
    assert!(report.plan.reload.is_empty());

    // B changed
    fs::write(dir.path().join("b.json"), r#"{"v": 2}"#).unwrap();
    monitor.tick().unwrap();
    assert_eq!(actions.take(), calls(&["reload:b"]));

    // Quiet pass
    let report = monitor.tick().unwrap();
    assert!(report.plan.is_empty());
    assert!(actions.take().is_empty());
}

#[test]
fn test_unreadable_conf_dir_skips_the_tick() {
    let rt = runtime();
    let dir = TempDir::new().unwrap();
    let actions = Arc::new(RecordingActions::default());
    let monitor = file_monitor(&dir, &rt, &actions);

    fs::write(dir.path().join("b.json"), "{}").unwrap();
    monitor.tick().unwrap();
    actions.take();

    let known_before = monitor.view().known;
    let moved = dir.path().with_extension("moved");
    fs::rename(dir.path(), &moved).unwrap();
    assert!(monitor.tick().is_err());
    assert!(actions.take().is_empty());
    assert_eq!(monitor.view().known, known_before);
    fs::rename(&moved, dir.path()).unwrap();
}

#[test]
fn test_remote_poll_follows_manager_versions() {
    let rt = runtime();
    let remote = Arc::new(StaticConfigClient::new("manager:8089"));
    remote.put("orders", json!({"filter": "orders"}), "1");
    remote.put("users", json!({"filter": "users"}), "1");

    let shared = remote.clone();
    let pool = Arc::new(ClientPool::new(Box::new(move |_address: &str| {
        Ok(shared.clone() as Arc<dyn RemoteConfigClient>)
    })));
    let source = RemotePollSource::new(pool.clone(), "manager:8089");
    assert_eq!(source.fingerprint("orders").unwrap(), "1");

    let actions = Arc::new(RecordingActions::default());
    let monitor = ScanMonitor::new(
        InstanceMode::Manager,
        source,
        Duration::from_secs(3600),
        rt.handle().clone(),
    );
    monitor.set_default_actions(actions.clone());

    monitor.tick().unwrap();
    assert_eq!(actions.take(), calls(&["start:orders", "start:users"]));

    remote.put("users", json!({"filter": "users.*"}), "2");
    remote.remove("orders");
    monitor.tick().unwrap();
    assert_eq!(actions.take(), calls(&["reload:users", "stop:orders"]));
    assert_eq!(pool.len(), 1);
}

#[test]
fn test_controller_follows_conf_dir() {
    let rt = runtime();
    let dir = conf_dir();
    let service = MemoryCoordination::new();
    let mut config = server_config(&dir, "10.0.0.1", &[]);
    config.auto_scan = true;
    let node = Node::start(&service, &config, &rt);
    let monitor = node.controller.monitor(InstanceMode::Local).unwrap();

    write_destination(&dir, "orders", r#"{"filter": "a"}"#);
    monitor.tick().unwrap();
    assert!(node.is_active("orders"));
    assert_eq!(monitor.registered(), vec!["orders".to_string()]);

    write_destination(&dir, "orders", r#"{"filter": "b"}"#);
    let report = monitor.tick().unwrap();
    assert_eq!(report.plan.reload, vec!["orders".to_string()]);
    assert!(node.is_active("orders"));
    assert_eq!(
        node.engine
            .pipeline("orders")
            .and_then(|p| p.definition.property("filter").map(str::to_string))
            .as_deref(),
        Some("b")
    );

    fs::remove_file(dir.path().join("orders.json")).unwrap();
    let report = monitor.tick().unwrap();
    assert_eq!(report.plan.stop, vec!["orders".to_string()]);
    assert!(!node.is_active("orders"));
    assert!(!node.controller.instance_configs().contains_key("orders"));
}

#[test]
fn test_failed_action_is_isolated() {
    let rt = runtime();
    let dir = conf_dir();
    let service = MemoryCoordination::new();
    let mut config = server_config(&dir, "10.0.0.1", &[]);
    config.auto_scan = true;
    let node = Node::start(&service, &config, &rt);
    let monitor = node.controller.monitor(InstanceMode::Local).unwrap();

    // An overlay that is not an object fails activation of "broken" only
    write_destination(&dir, "broken", "[1, 2]");
    write_destination(&dir, "orders", "{}");
    let report = monitor.tick().unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "broken");
    assert!(node.is_active("orders"));
    assert!(!node.is_active("broken"));
    assert!(monitor.view().known.contains_key("broken"));
}
