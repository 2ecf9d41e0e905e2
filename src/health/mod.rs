//! Health check records.
//!
//! # Data Flow
//! ```text
//! CheckDefinition (config)
//!     → CheckType (how the check is evaluated)
//!     → HealthCheck (runtime record bound to the node)
//!     → registered with the local agent
//! ```
//!
//! # Design Decisions
//! - Check execution is not done here; records only describe the check
//! - New checks start `critical` until their first result arrives

pub mod check;

pub use check::{CheckStatus, CheckType, HealthCheck};
