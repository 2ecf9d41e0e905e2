//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation after all overlays are merged (serde handles syntax)
//! - Every service and check has a name
//! - Every configured check type is well formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>

use crate::config::schema::Config;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("service #{index} has no name")]
    ServiceMissingName { index: usize },

    #[error("service '{name}' has an invalid check")]
    ServiceInvalidCheck { name: String },

    #[error("check #{index} has no name")]
    CheckMissingName { index: usize },

    #[error("check '{name}' must set exactly one of ttl_secs, script + interval_secs, http + interval_secs")]
    CheckInvalidType { name: String },

    #[error("bootstrap mode requires server mode")]
    BootstrapWithoutServer,
}

/// Validate a merged configuration.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (index, service) in config.services.iter().enumerate() {
        if service.name.is_empty() {
            errors.push(ValidationError::ServiceMissingName { index });
            continue;
        }
        if let Some(check) = service.check_type() {
            if !check.is_valid() {
                errors.push(ValidationError::ServiceInvalidCheck {
                    name: service.name.clone(),
                });
            }
        }
    }

    for (index, check) in config.checks.iter().enumerate() {
        if check.name.is_empty() {
            errors.push(ValidationError::CheckMissingName { index });
            continue;
        }
        if !check.check_type.is_valid() {
            errors.push(ValidationError::CheckInvalidType {
                name: check.name.clone(),
            });
        }
    }

    if config.bootstrap && !config.server {
        errors.push(ValidationError::BootstrapWithoutServer);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
