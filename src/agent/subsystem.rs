//! Interfaces between the orchestrator and the subsystems it starts.

use async_trait::async_trait;
use std::sync::Arc;

use crate::agent::catalog::NodeService;
use crate::config::Config;
use crate::health::{CheckType, HealthCheck};
use crate::observability::Telemetry;

/// Error starting or stopping a subsystem.
#[derive(Debug, thiserror::Error)]
pub enum SubsystemError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Failed(String),
}

/// Error registering a service or check with the agent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("service name is missing")]
    MissingServiceName,

    #[error("check name is missing")]
    MissingCheckName,

    #[error("check type is not valid")]
    InvalidCheckType,

    #[error("service '{0}' is not registered")]
    UnknownService(String),

    #[error("agent is shutting down")]
    ShuttingDown,

    #[error("{0}")]
    Rejected(String),
}

/// A started subsystem the orchestrator must release on exit.
#[async_trait]
pub trait Subsystem: Send + Sync {
    /// Name used in logs and shutdown reports.
    fn name(&self) -> &str;

    /// Stop the subsystem. Calling it again is a no-op.
    async fn shutdown(&self) -> Result<(), SubsystemError>;
}

/// The clustering side of the agent.
#[async_trait]
pub trait ClusterAgent: Subsystem {
    /// Contact each address; returns how many could be joined.
    async fn join(&self, addrs: &[String]) -> usize;

    /// Register a local service and its optional check.
    async fn add_service(
        &self,
        service: NodeService,
        check: Option<CheckType>,
    ) -> Result<(), RegistrationError>;

    /// Register a local health check.
    async fn add_check(&self, check: HealthCheck, check_type: CheckType) -> Result<(), RegistrationError>;

    /// Local registration is complete; state may now be advertised.
    fn start_sync(&self);
}

/// Starts the subsystems the orchestrator owns.
#[async_trait]
pub trait SubsystemFactory: Send + Sync {
    /// Start the cluster agent.
    async fn start_agent(
        &self,
        config: Arc<Config>,
        telemetry: Telemetry,
    ) -> Result<Arc<dyn ClusterAgent>, SubsystemError>;

    /// Start the internal RPC server, or `None` when it is disabled.
    async fn start_rpc(
        &self,
        config: Arc<Config>,
        telemetry: Telemetry,
    ) -> Result<Option<Arc<dyn Subsystem>>, SubsystemError>;

    /// Start the HTTP API, or `None` when it is disabled.
    async fn start_http(
        &self,
        config: Arc<Config>,
        telemetry: Telemetry,
    ) -> Result<Option<Arc<dyn Subsystem>>, SubsystemError>;
}
