//! Internal RPC transport.
//!
//! # Data Flow
//! ```text
//! Peer agent TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → rpc.rs (line protocol: PING, JOIN, MEMBERS)
//!     → agent::LocalAgent (membership update)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - One request per line, one reply per line

pub mod listener;
pub mod rpc;

pub use rpc::RpcServer;
