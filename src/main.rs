//! Cluster agent (v1)
//!
//! Long-running agent that joins a cluster, registers local services and
//! health checks, and serves a read-only HTTP API.
//!
//! # Architecture Overview
//!
//! ```text
//!   flags + TOML files
//!          │
//!          ▼
//!   ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//!   │    config    │──▶│  logging    │──▶│  telemetry   │
//!   │  resolution  │   │ (log gate)  │   │ inmem+statsite│
//!   └──────────────┘   └─────────────┘   └──────┬───────┘
//!                                               ▼
//!   ┌───────────────────────────────────────────────────────┐
//!   │                  lifecycle orchestrator                │
//!   │  agent ──▶ rpc ──▶ http ──▶ join ──▶ services/checks   │
//!   │        banner ──▶ await signal ──▶ reverse release     │
//!   └───────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use cluster_agent::config::Flags;
use cluster_agent::observability::{PrefixedUi, Ui};
use cluster_agent::{LocalSubsystems, Orchestrator};

#[tokio::main]
async fn main() {
    let ui = Arc::new(PrefixedUi::stdout());

    let args = match Flags::collect_args(std::env::args_os().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            ui.error(&e.to_string());
            std::process::exit(1);
        }
    };

    let orchestrator = Orchestrator::new(ui, Arc::new(LocalSubsystems::new()));
    let code = orchestrator.run(&args).await;

    std::process::exit(code);
}
