//! Lifecycle states of the agent, in the order they are reached.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AgentState {
    Starting,
    ConfigResolved,
    ObserveConcurrency,
    LoggingReady,
    TelemetryReady,
    SubsystemsStarted,
    Joined,
    ServicesRegistered,
    ChecksRegistered,
    SyncAnnounced,
    Running,
    AwaitingSignal,
    ShuttingDown,
    Exited,
    /// A step before `AwaitingSignal` failed.
    Failed,
}

impl AgentState {
    /// Whether the run has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Exited | AgentState::Failed)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
