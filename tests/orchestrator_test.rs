//! Lifecycle tests for the agent orchestrator.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

use cluster_agent::agent::LocalSubsystems;
use cluster_agent::lifecycle::{AgentState, ShutdownReason};
use cluster_agent::observability::ui::UiLine;
use cluster_agent::observability::CapturedUi;

mod common;

use common::{args, loopback_defaults, orchestrator, run_then_stop, MockBehavior, MockFactory};

fn write_config(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn config_arg(path: &PathBuf) -> Vec<String> {
    args(&["-config-file", path.to_str().unwrap()])
}

#[tokio::test]
async fn test_join_proceeds_with_one_reachable() {
    let ui = CapturedUi::new();
    let factory = Arc::new(MockFactory::new(MockBehavior {
        reachable: HashSet::from(["10.0.0.1".to_string()]),
        ..Default::default()
    }));
    let events = factory.events.clone();

    let orchestrator = orchestrator(&ui, factory, loopback_defaults());
    let code = run_then_stop(orchestrator, args(&["-join", "10.0.0.1", "-join", "10.0.0.2"])).await;

    assert_eq!(code, 0);
    assert!(events.contains("join:10.0.0.1"));
    assert!(events.contains("join:10.0.0.2"));
    assert!(events.contains("start_sync"));
    assert!(ui
        .lines()
        .contains(&UiLine::Info("Join completed. Synced with 1 initial agents".into())));
}

#[tokio::test]
async fn test_join_fails_when_nothing_reachable() {
    let ui = CapturedUi::new();
    let factory = Arc::new(MockFactory::new(MockBehavior::default()));
    let events = factory.events.clone();

    let orchestrator = orchestrator(&ui, factory, loopback_defaults());
    let code = run_then_stop(orchestrator, args(&["-join", "10.0.0.1", "-join", "10.0.0.2"])).await;

    assert_eq!(code, 1);
    assert!(ui.errors().iter().any(|e| e.contains("Failed to join")));
    assert!(!events.contains("start_sync"));
    // Started subsystems are still released
    assert!(events.contains("shutdown:http"));
    assert!(events.contains("shutdown:agent"));
}

#[tokio::test]
async fn test_no_join_without_addresses() {
    let ui = CapturedUi::new();
    let factory = Arc::new(MockFactory::new(MockBehavior::default()));
    let events = factory.events.clone();

    let orchestrator = orchestrator(&ui, factory, loopback_defaults());
    let code = run_then_stop(orchestrator, Vec::new()).await;

    assert_eq!(code, 0);
    assert!(!events.all().iter().any(|e| e.starts_with("join:")));
    assert!(!ui.lines().iter().any(|l| l.text().contains("Joining cluster")));
}

#[tokio::test]
async fn test_second_service_failure_names_it() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "services.toml",
        r#"
[[services]]
name = "web"
port = 80

[[services]]
name = "api"
port = 8080

[[checks]]
name = "mem"
ttl_secs = 30
"#,
    );

    let ui = CapturedUi::new();
    let factory = Arc::new(MockFactory::new(MockBehavior {
        failing_service: Some("api".into()),
        ..Default::default()
    }));
    let events = factory.events.clone();

    let orchestrator = orchestrator(&ui, factory, loopback_defaults());
    let code = run_then_stop(orchestrator, config_arg(&path)).await;

    assert_eq!(code, 1);
    assert!(ui
        .errors()
        .iter()
        .any(|e| e.contains("Failed to register service 'api'")));
    assert!(events.contains("add_service:web"));
    assert!(!events.contains("add_check:mem"));
    assert!(!events.contains("start_sync"));
}

#[tokio::test]
async fn test_check_failure_names_it() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "checks.toml",
        r#"
[[checks]]
name = "disk"
script = "/bin/check-disk"
interval_secs = 10
"#,
    );

    let ui = CapturedUi::new();
    let factory = Arc::new(MockFactory::new(MockBehavior {
        failing_check: Some("disk".into()),
        ..Default::default()
    }));

    let orchestrator = orchestrator(&ui, factory, loopback_defaults());
    let code = run_then_stop(orchestrator, config_arg(&path)).await;

    assert_eq!(code, 1);
    assert!(ui
        .errors()
        .iter()
        .any(|e| e.contains("Failed to register check 'disk'")));
}

#[tokio::test]
async fn test_shutdown_order_and_agent_error() {
    let ui = CapturedUi::new();
    let factory = Arc::new(MockFactory::new(MockBehavior {
        fail_agent_shutdown: true,
        ..Default::default()
    }));
    let events = factory.events.clone();

    let orchestrator = orchestrator(&ui, factory, loopback_defaults());
    let code = run_then_stop(orchestrator, Vec::new()).await;

    assert_eq!(code, 1);
    let http = events.position("shutdown:http").unwrap();
    let rpc = events.position("shutdown:rpc").unwrap();
    let agent = events.position("shutdown:agent").unwrap();
    assert!(http < rpc && rpc < agent);
    assert!(ui
        .errors()
        .iter()
        .any(|e| e.contains("error shutting down agent")));
}

#[tokio::test]
async fn test_http_start_failure_releases_started() {
    let ui = CapturedUi::new();
    let factory = Arc::new(MockFactory::new(MockBehavior {
        fail_http_start: true,
        ..Default::default()
    }));
    let events = factory.events.clone();

    let orchestrator = orchestrator(&ui, factory, loopback_defaults());
    let code = run_then_stop(orchestrator, Vec::new()).await;

    assert_eq!(code, 1);
    assert!(ui.errors().iter().any(|e| e.contains("Error starting http")));
    let rpc = events.position("shutdown:rpc").unwrap();
    let agent = events.position("shutdown:agent").unwrap();
    assert!(rpc < agent);
    assert!(!events.contains("shutdown:http"));
}

#[tokio::test]
async fn test_negative_port_disables_http() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "ports.toml", "[ports]\nhttp = -1\n");

    let ui = CapturedUi::new();
    let factory = Arc::new(MockFactory::new(MockBehavior::default()));
    let events = factory.events.clone();

    let orchestrator = orchestrator(&ui, factory, loopback_defaults());
    let code = run_then_stop(orchestrator, config_arg(&path)).await;

    assert_eq!(code, 0);
    assert!(!events.contains("start:http"));
    assert!(events.contains("start:rpc"));
}

#[tokio::test]
async fn test_telemetry_failure_before_any_start() {
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);

    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "telemetry.toml",
        &format!("statsite_addr = \"{}\"\n", addr),
    );

    let ui = CapturedUi::new();
    let factory = Arc::new(MockFactory::new(MockBehavior::default()));
    let events = factory.events.clone();

    let orchestrator = orchestrator(&ui, factory, loopback_defaults());
    let code = run_then_stop(orchestrator, config_arg(&path)).await;

    assert_eq!(code, 1);
    assert!(events.all().is_empty());
    assert!(ui.errors().iter().any(|e| e.contains("telemetry")));
}

#[tokio::test]
async fn test_banner_uses_hostname_and_flags() {
    let ui = CapturedUi::new();
    let factory = Arc::new(MockFactory::new(MockBehavior::default()));

    let orchestrator = orchestrator(&ui, factory, loopback_defaults());
    let code = run_then_stop(orchestrator, args(&["-dc", "east", "-server", "-bootstrap"])).await;

    assert_eq!(code, 0);
    let lines: Vec<String> = ui.lines().iter().map(|l| l.text().to_string()).collect();
    assert!(lines.iter().any(|l| l.contains("Node name: 'test-host'")));
    assert!(lines.iter().any(|l| l.contains("Datacenter: 'east'")));
    assert!(lines.iter().any(|l| l.contains("Server: true (bootstrap: true)")));
    assert!(lines
        .iter()
        .any(|l| l == "Log data will now stream in as it occurs:"));
}

#[tokio::test]
async fn test_invalid_log_level_is_fatal() {
    let ui = CapturedUi::new();
    let factory = Arc::new(MockFactory::new(MockBehavior::default()));
    let events = factory.events.clone();

    let orchestrator = orchestrator(&ui, factory, loopback_defaults());
    let mut state = orchestrator.state();
    let code = orchestrator.run(&args(&["-log-level", "loud"])).await;

    assert_eq!(code, 1);
    assert!(events.all().is_empty());
    assert_eq!(*state.borrow_and_update(), AgentState::Failed);
}

#[tokio::test]
async fn test_local_subsystems_serve_api() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "agent.toml",
        r#"
node_name = "web-1"

[[services]]
name = "web"
port = 80

[services.check]
ttl_secs = 15
"#,
    );

    let ui = CapturedUi::new();
    let factory = Arc::new(LocalSubsystems::new());
    let orchestrator = orchestrator(&ui, factory.clone(), loopback_defaults());
    let shutdown = orchestrator.shutdown_handle();
    let mut state = orchestrator.state();

    let run_args = config_arg(&path);
    let run = tokio::spawn(async move { orchestrator.run(&run_args).await });
    state
        .wait_for(|s| *s == AgentState::AwaitingSignal)
        .await
        .unwrap();

    let base = format!("http://{}", factory.http_addr().unwrap());
    let services: serde_json::Value = reqwest::get(format!("{}/v1/agent/services", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(services["web"]["port"], 80);

    let checks: serde_json::Value = reqwest::get(format!("{}/v1/agent/checks", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(checks["service:web"]["status"], "critical");

    let me: serde_json::Value = reqwest::get(format!("{}/v1/agent/self", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["member"]["name"], "web-1");
    assert_eq!(me["syncing"], true);

    shutdown.trigger(ShutdownReason::Requested);
    assert_eq!(run.await.unwrap(), 0);
}

#[tokio::test]
async fn test_local_agents_join_each_other() {
    let ui = CapturedUi::new();
    let first_factory = Arc::new(LocalSubsystems::new());
    let first = orchestrator(&ui, first_factory.clone(), loopback_defaults());
    let first_stop = first.shutdown_handle();
    let mut first_state = first.state();
    let first_run = tokio::spawn(async move { first.run(&args(&["-node", "first"])).await });
    first_state
        .wait_for(|s| *s == AgentState::AwaitingSignal)
        .await
        .unwrap();

    let peer = first_factory.rpc_addr().unwrap().to_string();
    let second_ui = CapturedUi::new();
    let second = orchestrator(&second_ui, Arc::new(LocalSubsystems::new()), loopback_defaults());
    let code = run_then_stop(second, args(&["-node", "second", "-join", &peer])).await;
    assert_eq!(code, 0);
    assert!(second_ui
        .lines()
        .contains(&UiLine::Info("Join completed. Synced with 1 initial agents".into())));

    let base = format!("http://{}", first_factory.http_addr().unwrap());
    let members: serde_json::Value = reqwest::get(format!("{}/v1/agent/members", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(members
        .as_array()
        .unwrap()
        .iter()
        .any(|m| m["name"] == "second"));

    first_stop.trigger(ShutdownReason::Requested);
    assert_eq!(first_run.await.unwrap(), 0);
}
