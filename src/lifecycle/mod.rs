//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (orchestrator.rs):
//!     Flags → Config files → Resolve → Logging → Telemetry
//!     → Subsystems → Join → Services → Checks → Sync → Banner
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown (shutdown.rs)
//!     SIGUSR1 → metrics dump
//!     SIGHUP → logged, ignored
//!
//! Shutdown (release.rs):
//!     HTTP → RPC → cluster agent, every release attempted
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then observability, then subsystems
//! - Ordered shutdown: reverse acquisition order
//! - Shutdown errors are collected, never short-circuit

pub mod error;
pub mod orchestrator;
pub mod release;
pub mod shutdown;
pub mod signals;
pub mod state;

pub use error::AgentError;
pub use orchestrator::{Orchestrator, RunOutcome, StopReport};
pub use release::{ReleaseStack, ShutdownError};
pub use shutdown::{Shutdown, ShutdownReason};
pub use state::AgentState;
