//! Cluster agent library.

pub mod agent;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use agent::{LocalSubsystems, SubsystemFactory};
pub use config::Config;
pub use lifecycle::{Orchestrator, Shutdown};
