//! Configuration resolution.
//!
//! # Responsibilities
//! - Layer defaults < file configuration < command-line flags
//! - Fill in the node name from host identity when unset
//! - Stamp build metadata
//!
//! # Design Decisions
//! - The only side effect is the optional hostname lookup
//! - A failed lookup aborts resolution; no partial snapshot is returned

use std::sync::Arc;

use crate::config::loader::ConfigError;
use crate::config::merge::merge;
use crate::config::schema::{BuildInfo, Config};
use crate::config::validation::validate_config;

/// Source of the host identity used as the default node name.
pub trait HostnameProvider: Send + Sync {
    fn hostname(&self) -> Result<String, std::io::Error>;
}

/// Host identity from the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHostname;

impl HostnameProvider for SystemHostname {
    fn hostname(&self) -> Result<String, std::io::Error> {
        let name = hostname::get()?;
        name.into_string().map_err(|raw| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("hostname is not valid UTF-8: {:?}", raw),
            )
        })
    }
}

/// Resolve the immutable configuration snapshot.
pub fn resolve(
    defaults: Config,
    flags: &Config,
    file: Option<&Config>,
    hosts: &dyn HostnameProvider,
    build: &BuildInfo,
) -> Result<Arc<Config>, ConfigError> {
    let mut config = defaults;
    if let Some(file) = file {
        config = merge(&config, file);
    }
    config = merge(&config, flags);

    if config.node_name.is_empty() {
        let hostname = hosts.hostname().map_err(ConfigError::Hostname)?;
        if hostname.is_empty() {
            return Err(ConfigError::Hostname(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "host reported an empty hostname",
            )));
        }
        config.node_name = hostname;
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    config.build = build.clone();

    Ok(Arc::new(config))
}
