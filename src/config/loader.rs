//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::merge::merge;
use crate::config::schema::Config;
use crate::config::validation::ValidationError;

/// Error type for configuration resolution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0}")]
    Flags(String),

    #[error("error reading '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("error determining hostname: {0}")]
    Hostname(#[source] std::io::Error),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from a single TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Read every file, then every `*.toml` file of every directory (in
/// lexical order), merging each over the previous ones.
pub fn read_config_paths(files: &[PathBuf], dirs: &[PathBuf]) -> Result<Config, ConfigError> {
    let mut paths: Vec<PathBuf> = files.to_vec();

    for dir in dirs {
        let entries = fs::read_dir(dir).map_err(|source| ConfigError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ConfigError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
                found.push(path);
            }
        }
        found.sort();
        paths.extend(found);
    }

    let mut result = Config::default();
    for path in &paths {
        let file_config = load_config(path)?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        result = merge(&result, &file_config);
    }
    Ok(result)
}
