//! Cluster agent subsystems.
//!
//! # Data Flow
//! ```text
//! SubsystemFactory (subsystem.rs)
//!     → start_agent → LocalAgent (local.rs): catalog.rs + membership
//!     → start_rpc   → net::rpc::RpcServer (join requests from peers)
//!     → start_http  → http::HttpServer (read-only agent API)
//! ```
//!
//! # Design Decisions
//! - The orchestrator only sees the traits in subsystem.rs
//! - Every started subsystem exposes an idempotent `shutdown`
//! - Registration errors name nothing; the orchestrator adds the entity name

pub mod catalog;
pub mod factory;
pub mod local;
pub mod subsystem;

pub use catalog::{Member, MemberStatus, NodeService};
pub use factory::LocalSubsystems;
pub use local::LocalAgent;
pub use subsystem::{ClusterAgent, RegistrationError, Subsystem, SubsystemError, SubsystemFactory};
