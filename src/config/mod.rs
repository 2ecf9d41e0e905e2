//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults (schema.rs)
//!     → config files (loader.rs, TOML)
//!     → command-line flags (flags.rs)
//!     → merge.rs (later overlays win)
//!     → resolver.rs (hostname fallback, validation.rs, build metadata)
//!     → Arc<Config> (immutable, shared by every startup step)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once resolved
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod flags;
pub mod loader;
pub mod merge;
pub mod resolver;
pub mod schema;
pub mod validation;

pub use flags::Flags;
pub use loader::ConfigError;
pub use resolver::{resolve, HostnameProvider, SystemHostname};
pub use schema::{BuildInfo, CheckDefinition, Config, PortConfig, ServiceDefinition};
