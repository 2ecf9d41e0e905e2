//! Shared utilities for orchestrator integration tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use cluster_agent::agent::{
    ClusterAgent, NodeService, RegistrationError, Subsystem, SubsystemError, SubsystemFactory,
};
use cluster_agent::config::{Config, HostnameProvider};
use cluster_agent::health::{CheckType, HealthCheck};
use cluster_agent::lifecycle::{AgentState, Orchestrator};
use cluster_agent::observability::{CapturedUi, Telemetry};

/// Ordered log of everything the mock subsystems were asked to do.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.all().iter().position(|e| e == event)
    }

    pub fn contains(&self, event: &str) -> bool {
        self.position(event).is_some()
    }
}

/// How the mock subsystems behave.
#[derive(Default, Clone)]
pub struct MockBehavior {
    /// Join addresses that succeed; all others fail.
    pub reachable: HashSet<String>,
    /// Service name whose registration is rejected.
    pub failing_service: Option<String>,
    /// Check name whose registration is rejected.
    pub failing_check: Option<String>,
    /// The cluster agent reports an error on shutdown.
    pub fail_agent_shutdown: bool,
    /// Starting the HTTP server fails.
    pub fail_http_start: bool,
}

/// A factory whose subsystems only record calls.
pub struct MockFactory {
    pub events: Events,
    behavior: MockBehavior,
}

impl MockFactory {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            events: Events::default(),
            behavior,
        }
    }
}

struct MockAgent {
    events: Events,
    behavior: MockBehavior,
}

#[async_trait]
impl Subsystem for MockAgent {
    fn name(&self) -> &str {
        "agent"
    }

    async fn shutdown(&self) -> Result<(), SubsystemError> {
        self.events.push("shutdown:agent");
        if self.behavior.fail_agent_shutdown {
            return Err(SubsystemError::Failed("agent refused to leave".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterAgent for MockAgent {
    async fn join(&self, addrs: &[String]) -> usize {
        let mut joined = 0;
        for addr in addrs {
            self.events.push(format!("join:{}", addr));
            if self.behavior.reachable.contains(addr) {
                joined += 1;
            }
        }
        joined
    }

    async fn add_service(
        &self,
        service: NodeService,
        _check: Option<CheckType>,
    ) -> Result<(), RegistrationError> {
        self.events.push(format!("add_service:{}", service.service));
        if self.behavior.failing_service.as_deref() == Some(service.service.as_str()) {
            return Err(RegistrationError::Rejected("port already taken".into()));
        }
        Ok(())
    }

    async fn add_check(&self, check: HealthCheck, _check_type: CheckType) -> Result<(), RegistrationError> {
        self.events.push(format!("add_check:{}", check.name));
        if self.behavior.failing_check.as_deref() == Some(check.name.as_str()) {
            return Err(RegistrationError::Rejected("script not allowed".into()));
        }
        Ok(())
    }

    fn start_sync(&self) {
        self.events.push("start_sync");
    }
}

struct MockServer {
    name: &'static str,
    events: Events,
}

#[async_trait]
impl Subsystem for MockServer {
    fn name(&self) -> &str {
        self.name
    }

    async fn shutdown(&self) -> Result<(), SubsystemError> {
        self.events.push(format!("shutdown:{}", self.name));
        Ok(())
    }
}

#[async_trait]
impl SubsystemFactory for MockFactory {
    async fn start_agent(
        &self,
        _config: Arc<Config>,
        _telemetry: Telemetry,
    ) -> Result<Arc<dyn ClusterAgent>, SubsystemError> {
        self.events.push("start:agent");
        Ok(Arc::new(MockAgent {
            events: self.events.clone(),
            behavior: self.behavior.clone(),
        }))
    }

    async fn start_rpc(
        &self,
        config: Arc<Config>,
        _telemetry: Telemetry,
    ) -> Result<Option<Arc<dyn Subsystem>>, SubsystemError> {
        if config.rpc_addr().is_none() {
            return Ok(None);
        }
        self.events.push("start:rpc");
        Ok(Some(Arc::new(MockServer {
            name: "rpc",
            events: self.events.clone(),
        })))
    }

    async fn start_http(
        &self,
        config: Arc<Config>,
        _telemetry: Telemetry,
    ) -> Result<Option<Arc<dyn Subsystem>>, SubsystemError> {
        if config.http_addr().is_none() {
            return Ok(None);
        }
        self.events.push("start:http");
        if self.behavior.fail_http_start {
            return Err(SubsystemError::Failed("address in use".into()));
        }
        Ok(Some(Arc::new(MockServer {
            name: "http",
            events: self.events.clone(),
        })))
    }
}

pub struct FixedHost(pub &'static str);

impl HostnameProvider for FixedHost {
    fn hostname(&self) -> Result<String, std::io::Error> {
        Ok(self.0.to_string())
    }
}

/// An orchestrator wired to `factory` with a captured UI and no OS signals.
pub fn orchestrator(
    ui: &CapturedUi,
    factory: Arc<dyn SubsystemFactory>,
    defaults: Config,
) -> Orchestrator {
    Orchestrator::new(Arc::new(ui.clone()), factory)
        .with_defaults(defaults)
        .with_hostname_provider(Arc::new(FixedHost("test-host")))
        .without_signal_handlers()
        .with_parallelism(4)
}

/// Run `orchestrator` until it awaits a signal, then stop it. Returns the
/// exit code.
pub async fn run_then_stop(orchestrator: Orchestrator, args: Vec<String>) -> i32 {
    let shutdown = orchestrator.shutdown_handle();
    let mut state = orchestrator.state();
    let run = tokio::spawn(async move { orchestrator.run(&args).await });

    let reached = state
        .wait_for(|s| *s == AgentState::AwaitingSignal || s.is_terminal())
        .await
        .map(|s| *s)
        .unwrap_or(AgentState::Failed);
    if reached == AgentState::AwaitingSignal {
        shutdown.trigger(cluster_agent::lifecycle::ShutdownReason::Requested);
    }
    run.await.unwrap()
}

/// Test defaults: both listeners enabled on loopback.
pub fn loopback_defaults() -> Config {
    let mut config = Config::defaults();
    config.bind_addr = "127.0.0.1".into();
    config.ports.http = 0;
    config.ports.server = 0;
    config
}

/// Arguments as owned strings.
pub fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
