//! HTTP API subsystem.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → server.rs (axum router, TraceLayer)
//!     → middleware/ (request latency metric)
//!     → handlers.rs (read-only views of the local agent)
//! ```
//!
//! # Design Decisions
//! - Every endpoint is a GET returning JSON
//! - Shutdown is graceful: in-flight requests finish first

pub mod handlers;
pub mod middleware;
pub mod server;

pub use server::HttpServer;
