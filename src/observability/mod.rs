//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     ui.rs       → operator console (banner, fatal errors)
//!     logging.rs  → tracing subscriber → LogGate → stderr / log file
//!     metrics.rs  → Telemetry → SinkRecorder → inmem.rs (+ statsite.rs)
//!
//! On dump request (SIGUSR1):
//!     DumpTrigger → dump listener → InmemSink::dump → stderr
//! ```
//!
//! # Design Decisions
//! - Logs stay gated until the banner is printed
//! - Telemetry is an explicit dependency, never a global
//! - A misconfigured remote sink is fatal at startup

pub mod inmem;
pub mod logging;
pub mod metrics;
pub mod statsite;
pub mod ui;

pub use logging::{setup_logging, LogGate, LoggingError};
pub use metrics::{dump_channel, wire_telemetry, DumpTrigger, Telemetry, TelemetrySinkError};
pub use ui::{CapturedUi, PrefixedUi, Ui};
