//! The agent lifecycle.
//!
//! # Responsibilities
//! - Resolve configuration, then bring up logging and telemetry
//! - Start the subsystems, join the cluster, register services and checks
//! - Print the banner, release the log gate and wait for termination
//! - Release every started subsystem, newest first, on every exit path
//!
//! # Design Decisions
//! - Every step before `AwaitingSignal` is fatal on error
//! - Registration is fail-fast; earlier registrations are not rolled back
//! - Shutdown is best effort: all releases are attempted, errors collected

use async_trait::async_trait;
use clap::error::ErrorKind;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::agent::{ClusterAgent, Subsystem, SubsystemError, SubsystemFactory};
use crate::config::loader::read_config_paths;
use crate::config::{resolve, BuildInfo, Config, ConfigError, Flags, HostnameProvider, SystemHostname};
use crate::lifecycle::error::AgentError;
use crate::lifecycle::release::{ReleaseStack, ShutdownError};
use crate::lifecycle::shutdown::{Shutdown, ShutdownReason};
use crate::lifecycle::signals::{await_termination, spawn_signal_listener};
use crate::lifecycle::state::AgentState;
use crate::observability::metrics::DumpRequests;
use crate::observability::{dump_channel, setup_logging, wire_telemetry, DumpTrigger, LogGate, Telemetry, Ui};

/// How a run ended without a fatal error.
#[derive(Debug)]
pub enum RunOutcome {
    /// Help or version was requested; nothing was started.
    Usage(String),
    /// The agent ran and was told to stop.
    Stopped(StopReport),
}

/// Result of an orderly termination.
#[derive(Debug)]
pub struct StopReport {
    pub reason: ShutdownReason,
    pub shutdown_errors: Vec<ShutdownError>,
}

/// Drives one agent run from flags to exit code.
pub struct Orchestrator {
    ui: Arc<dyn Ui>,
    factory: Arc<dyn SubsystemFactory>,
    defaults: Config,
    hosts: Arc<dyn HostnameProvider>,
    build: BuildInfo,
    install_signals: bool,
    parallelism: Option<usize>,
    shutdown: Shutdown,
    dump: DumpTrigger,
    dump_requests: Option<DumpRequests>,
    state: Arc<watch::Sender<AgentState>>,
}

impl Orchestrator {
    pub fn new(ui: Arc<dyn Ui>, factory: Arc<dyn SubsystemFactory>) -> Self {
        let (dump, dump_requests) = dump_channel();
        let (state, _) = watch::channel(AgentState::Starting);
        Self {
            ui,
            factory,
            defaults: Config::defaults(),
            hosts: Arc::new(SystemHostname),
            build: BuildInfo::current(),
            install_signals: true,
            parallelism: None,
            shutdown: Shutdown::new(),
            dump,
            dump_requests: Some(dump_requests),
            state: Arc::new(state),
        }
    }

    /// Replace the base configuration every resolution starts from.
    pub fn with_defaults(mut self, defaults: Config) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_hostname_provider(mut self, hosts: Arc<dyn HostnameProvider>) -> Self {
        self.hosts = hosts;
        self
    }

    pub fn with_build_info(mut self, build: BuildInfo) -> Self {
        self.build = build;
        self
    }

    /// Do not install OS signal handlers; stop through [`Self::shutdown_handle`].
    pub fn without_signal_handlers(mut self) -> Self {
        self.install_signals = false;
        self
    }

    /// Override the number of logical CPUs reported by the host.
    pub fn with_parallelism(mut self, cpus: usize) -> Self {
        self.parallelism = Some(cpus);
        self
    }

    /// Handle that terminates a running agent.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Handle that requests a metrics dump.
    pub fn dump_trigger(&self) -> DumpTrigger {
        self.dump.clone()
    }

    /// Observe lifecycle progress.
    pub fn state(&self) -> watch::Receiver<AgentState> {
        self.state.subscribe()
    }

    fn enter(&self, state: AgentState) {
        tracing::debug!(state = %state, "Agent state");
        self.state.send_replace(state);
    }

    /// Run the agent with `args` (without the program name) and return the
    /// process exit code.
    pub async fn run(self, args: &[String]) -> i32 {
        let ui = self.ui.clone();
        let state = self.state.clone();

        match self.run_agent(args).await {
            Ok(RunOutcome::Usage(text)) => {
                ui.output(text.trim_end());
                0
            }
            Ok(RunOutcome::Stopped(report)) => {
                state.send_replace(AgentState::Exited);
                if report.shutdown_errors.is_empty() {
                    0
                } else {
                    1
                }
            }
            Err(e) => {
                state.send_replace(AgentState::Failed);
                ui.error(&e.to_string());
                1
            }
        }
    }

    /// Run the agent, returning the fatal error instead of an exit code.
    pub async fn run_agent(mut self, args: &[String]) -> Result<RunOutcome, AgentError> {
        let flags = match Flags::parse_args(args) {
            Ok(flags) => flags,
            Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                return Ok(RunOutcome::Usage(e.to_string()));
            }
            Err(e) => return Err(ConfigError::Flags(e.to_string()).into()),
        };

        let file = if flags.config_files.is_empty() && flags.config_dirs.is_empty() {
            None
        } else {
            Some(read_config_paths(&flags.config_files, &flags.config_dirs)?)
        };
        let config = resolve(
            self.defaults.clone(),
            &flags.overlay(),
            file.as_ref(),
            self.hosts.as_ref(),
            &self.build,
        )?;
        self.enter(AgentState::ConfigResolved);

        let cpus = self.parallelism.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        if cpus == 1 {
            self.ui
                .error("WARNING: It is highly recommended to run with more than one CPU");
        }
        self.enter(AgentState::ObserveConcurrency);

        let gate = setup_logging(&config, self.ui.as_ref())?;
        self.enter(AgentState::LoggingReady);

        let outcome = self.run_logged(&config, &gate).await;

        // Logs written before any failure are released too
        if let Err(e) = gate.flush() {
            self.ui.error(&format!("Failed to flush logs: {}", e));
        }
        outcome
    }

    /// Everything after logging is up: telemetry, signals, the subsystems
    /// and their release.
    async fn run_logged(
        &mut self,
        config: &Arc<Config>,
        gate: &LogGate,
    ) -> Result<RunOutcome, AgentError> {
        let (_, idle) = dump_channel();
        let requests = self.dump_requests.take().unwrap_or(idle);
        let telemetry = wire_telemetry(config, requests).await?;
        self.enter(AgentState::TelemetryReady);

        let signals = if self.install_signals {
            Some(
                spawn_signal_listener(self.shutdown.clone(), self.dump.clone())
                    .map_err(AgentError::Signals)?,
            )
        } else {
            None
        };

        let mut stack = ReleaseStack::new();
        let result = self.start_and_serve(config, &telemetry, gate, &mut stack).await;

        self.enter(AgentState::ShuttingDown);
        let shutdown_errors = stack.release_all().await;
        for e in &shutdown_errors {
            self.ui.error(&e.to_string());
        }
        stop_signals(signals);

        let reason = result?;
        Ok(RunOutcome::Stopped(StopReport {
            reason,
            shutdown_errors,
        }))
    }

    async fn start_and_serve(
        &self,
        config: &Arc<Config>,
        telemetry: &Telemetry,
        gate: &LogGate,
        stack: &mut ReleaseStack,
    ) -> Result<ShutdownReason, AgentError> {
        self.ui.output("Starting agent...");
        let agent = self
            .factory
            .start_agent(config.clone(), telemetry.clone())
            .await
            .map_err(|source| AgentError::SubsystemStart {
                subsystem: "agent",
                source,
            })?;
        stack.push(Arc::new(AgentHandle(agent.clone())));

        let rpc = self
            .factory
            .start_rpc(config.clone(), telemetry.clone())
            .await
            .map_err(|source| AgentError::SubsystemStart {
                subsystem: "rpc",
                source,
            })?;
        if let Some(rpc) = rpc {
            stack.push(rpc);
        }

        let http = self
            .factory
            .start_http(config.clone(), telemetry.clone())
            .await
            .map_err(|source| AgentError::SubsystemStart {
                subsystem: "http",
                source,
            })?;
        if let Some(http) = http {
            stack.push(http);
        }
        self.enter(AgentState::SubsystemsStarted);

        if !config.start_join.is_empty() {
            self.ui.output("Joining cluster...");
            let joined = agent.join(&config.start_join).await;
            if joined == 0 {
                return Err(AgentError::Join {
                    addresses: config.start_join.clone(),
                });
            }
            self.ui
                .info(&format!("Join completed. Synced with {} initial agents", joined));
        }
        self.enter(AgentState::Joined);

        for service in &config.services {
            agent
                .add_service(service.node_service(), service.check_type())
                .await
                .map_err(|source| AgentError::ServiceRegistration {
                    name: service.name.clone(),
                    source,
                })?;
        }
        self.enter(AgentState::ServicesRegistered);

        for check in &config.checks {
            agent
                .add_check(check.health_check(&config.node_name), check.check_type.clone())
                .await
                .map_err(|source| AgentError::CheckRegistration {
                    name: check.name.clone(),
                    source,
                })?;
        }
        self.enter(AgentState::ChecksRegistered);

        agent.start_sync();
        self.enter(AgentState::SyncAnnounced);

        self.print_banner(config);
        if let Err(e) = gate.flush() {
            self.ui.error(&format!("Failed to flush logs: {}", e));
        }
        self.enter(AgentState::Running);

        self.enter(AgentState::AwaitingSignal);
        let reason = await_termination(&self.shutdown).await;
        self.ui
            .output(&format!("Caught {}, gracefully shutting down agent...", reason));
        Ok(reason)
    }

    fn print_banner(&self, config: &Config) {
        let ui = self.ui.as_ref();
        ui.output("Agent running!");
        ui.info(&format!("           Version: '{}'", config.build.human()));
        ui.info(&format!("         Node name: '{}'", config.node_name));
        ui.info(&format!("        Datacenter: '{}'", config.datacenter));
        ui.info(&format!(
            "            Server: {} (bootstrap: {})",
            config.server, config.bootstrap
        ));
        ui.info(&format!(
            "       Client Addr: {} (HTTP: {}, RPC: {})",
            config.client_addr, config.ports.http, config.ports.server
        ));
        ui.info(&format!(
            "      Cluster Addr: {} (RPC: {})",
            config.advertise(),
            config.ports.server
        ));
        ui.info(&format!(
            "    Gossip encrypt: {}, RPC-TLS: {}, TLS-Incoming: {}",
            !config.encrypt.is_empty(),
            config.verify_outgoing,
            config.verify_incoming
        ));
        ui.info("");
        ui.output("Log data will now stream in as it occurs:");
    }
}

fn stop_signals(signals: Option<JoinHandle<()>>) {
    if let Some(task) = signals {
        task.abort();
    }
}

/// Releases the cluster agent through the common [`Subsystem`] interface.
struct AgentHandle(Arc<dyn ClusterAgent>);

#[async_trait]
impl Subsystem for AgentHandle {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn shutdown(&self) -> Result<(), SubsystemError> {
        self.0.shutdown().await
    }
}
