//! Fatal agent errors.

use crate::agent::{RegistrationError, SubsystemError};
use crate::config::ConfigError;
use crate::observability::{LoggingError, TelemetrySinkError};

/// An error that aborts the agent run.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Error resolving configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Error setting up logging: {0}")]
    Logging(#[from] LoggingError),

    #[error("Error setting up telemetry: {0}")]
    Telemetry(#[from] TelemetrySinkError),

    #[error("Error installing signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error("Error starting {subsystem}: {source}")]
    SubsystemStart {
        subsystem: &'static str,
        #[source]
        source: SubsystemError,
    },

    #[error("Failed to join any of {}", addresses.join(", "))]
    Join { addresses: Vec<String> },

    #[error("Failed to register service '{name}': {source}")]
    ServiceRegistration {
        name: String,
        #[source]
        source: RegistrationError,
    },

    #[error("Failed to register check '{name}': {source}")]
    CheckRegistration {
        name: String,
        #[source]
        source: RegistrationError,
    },
}
