//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the agent.
//! All types derive Serde traits for deserialization from config files.
//!
//! `Config::default()` is the *empty* configuration used for overlays (a file
//! or the command line); `Config::defaults()` is the hard-coded base snapshot.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::agent::NodeService;
use crate::health::{CheckStatus, CheckType, HealthCheck};

/// Default HTTP API port.
pub const DEFAULT_HTTP_PORT: i32 = 8500;

/// Default internal RPC port.
pub const DEFAULT_SERVER_PORT: i32 = 8300;

/// Root configuration for the agent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERR).
    pub log_level: String,

    /// Append logs to this file instead of stderr.
    pub log_file: Option<PathBuf>,

    /// Name this node advertises. Defaults to the hostname.
    pub node_name: String,

    /// Datacenter this node belongs to.
    pub datacenter: String,

    /// Address for cluster facing listeners (internal RPC).
    pub bind_addr: String,

    /// Address for client facing listeners (HTTP API).
    pub client_addr: String,

    /// Address advertised to other members. Defaults to `bind_addr`.
    pub advertise_addr: String,

    /// Port configuration.
    pub ports: PortConfig,

    /// Addresses to join at startup. If none of them can be reached the
    /// agent exits with an error.
    pub start_join: Vec<String>,

    /// Run in server mode.
    pub server: bool,

    /// Bootstrap a new cluster (server mode only).
    pub bootstrap: bool,

    /// Gossip encryption key. Only its presence is reported.
    pub encrypt: String,

    /// Verify TLS on outgoing RPC connections.
    pub verify_outgoing: bool,

    /// Verify TLS on incoming RPC connections.
    pub verify_incoming: bool,

    /// Address of a statsite/statsd-compatible TCP sink.
    pub statsite_addr: String,

    /// Services registered at startup.
    pub services: Vec<ServiceDefinition>,

    /// Checks registered at startup.
    pub checks: Vec<CheckDefinition>,

    /// Build metadata, stamped at resolution time.
    #[serde(skip)]
    pub build: BuildInfo,
}

impl Config {
    /// The base snapshot every resolution starts from.
    pub fn defaults() -> Self {
        Self {
            log_level: "INFO".to_string(),
            datacenter: "dc1".to_string(),
            bind_addr: "0.0.0.0".to_string(),
            client_addr: "127.0.0.1".to_string(),
            ports: PortConfig {
                http: DEFAULT_HTTP_PORT,
                server: DEFAULT_SERVER_PORT,
            },
            ..Default::default()
        }
    }

    /// Address advertised to other members.
    pub fn advertise(&self) -> &str {
        if self.advertise_addr.is_empty() {
            &self.bind_addr
        } else {
            &self.advertise_addr
        }
    }

    /// HTTP listener address, or `None` when the HTTP API is disabled.
    pub fn http_addr(&self) -> Option<String> {
        listen_addr(&self.client_addr, self.ports.http)
    }

    /// Internal RPC listener address, or `None` when disabled.
    pub fn rpc_addr(&self) -> Option<String> {
        listen_addr(&self.bind_addr, self.ports.server)
    }
}

fn listen_addr(host: &str, port: i32) -> Option<String> {
    if port < 0 {
        return None;
    }
    Some(format!("{}:{}", host, port))
}

/// Port configuration.
///
/// In overlays `0` means "not set". A negative port disables the listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PortConfig {
    /// HTTP API.
    pub http: i32,

    /// Internal RPC.
    pub server: i32,
}

/// A service declared in configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceDefinition {
    /// Unique service instance ID. Defaults to the name.
    pub id: String,

    /// Service name.
    pub name: String,

    /// Free-form tags.
    pub tags: Vec<String>,

    /// Port the service listens on.
    pub port: u16,

    /// Optional check attached to the service.
    pub check: CheckType,
}

impl ServiceDefinition {
    /// Runtime record registered with the agent.
    pub fn node_service(&self) -> NodeService {
        let id = if self.id.is_empty() {
            self.name.clone()
        } else {
            self.id.clone()
        };
        NodeService {
            id,
            service: self.name.clone(),
            tags: self.tags.clone(),
            port: self.port,
        }
    }

    /// The attached check type, if one was configured at all.
    pub fn check_type(&self) -> Option<CheckType> {
        if self.check.is_empty() {
            None
        } else {
            Some(self.check.clone())
        }
    }
}

/// A standalone check declared in configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CheckDefinition {
    /// Unique check ID. Defaults to the name.
    pub id: String,

    /// Check name.
    pub name: String,

    /// Human readable notes.
    pub notes: String,

    /// Bind the check to a registered service.
    pub service_id: String,

    /// How the check is evaluated.
    #[serde(flatten)]
    pub check_type: CheckType,
}

impl CheckDefinition {
    /// Runtime record bound to `node`.
    pub fn health_check(&self, node: &str) -> HealthCheck {
        let check_id = if self.id.is_empty() {
            self.name.clone()
        } else {
            self.id.clone()
        };
        HealthCheck {
            node: node.to_string(),
            check_id,
            name: self.name.clone(),
            status: CheckStatus::Critical,
            notes: self.notes.clone(),
            output: String::new(),
            service_id: self.service_id.clone(),
            service_name: String::new(),
        }
    }
}

/// Build metadata. Never read from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildInfo {
    /// Source revision the binary was built from.
    pub revision: String,

    /// Release version.
    pub version: String,

    /// Pre-release label ("dev", "rc1", ...); empty for releases.
    pub prerelease: String,
}

impl BuildInfo {
    /// Metadata baked in at compile time.
    pub fn current() -> Self {
        Self {
            revision: option_env!("AGENT_GIT_COMMIT").unwrap_or("").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            prerelease: option_env!("AGENT_VERSION_PRERELEASE")
                .unwrap_or("dev")
                .to_string(),
        }
    }

    /// Human readable version string, e.g. `v0.1.0-dev (abc123)`.
    pub fn human(&self) -> String {
        let mut out = format!("v{}", self.version);
        if !self.prerelease.is_empty() {
            out.push('-');
            out.push_str(&self.prerelease);
        }
        if !self.revision.is_empty() {
            out.push_str(&format!(" ({})", self.revision));
        }
        out
    }
}
