//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber at the configured level
//! - Hold log output behind a gate until the startup banner is printed
//!
//! # Design Decisions
//! - The gate is one-way: gated → released, never back
//! - Each formatted event is one buffered entry, replayed in arrival order
//! - `RUST_LOG` overrides the configured level when set

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::observability::ui::Ui;

/// Error type for logging setup.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log level '{level}'; valid log levels are TRACE, DEBUG, INFO, WARN, ERR")]
    InvalidLevel { level: String },

    #[error("failed to open log file '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Parse a configured log level.
pub fn parse_log_level(level: &str) -> Result<LevelFilter, LoggingError> {
    match level.to_ascii_uppercase().as_str() {
        "TRACE" => Ok(LevelFilter::TRACE),
        "DEBUG" => Ok(LevelFilter::DEBUG),
        "INFO" => Ok(LevelFilter::INFO),
        "WARN" => Ok(LevelFilter::WARN),
        "ERR" | "ERROR" => Ok(LevelFilter::ERROR),
        _ => Err(LoggingError::InvalidLevel {
            level: level.to_string(),
        }),
    }
}

struct GateState {
    released: bool,
    buffer: Vec<Vec<u8>>,
    out: Box<dyn Write + Send>,
}

/// Buffers log entries until [`LogGate::flush`], then forwards them directly.
#[derive(Clone)]
pub struct LogGate {
    state: Arc<Mutex<GateState>>,
}

impl LogGate {
    /// Create a gate in front of `out`. Starts gated.
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState {
                released: false,
                buffer: Vec::new(),
                out,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Write one entry. Buffered while gated.
    pub fn write_entry(&self, entry: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        if state.released {
            state.out.write_all(entry)
        } else {
            state.buffer.push(entry.to_vec());
            Ok(())
        }
    }

    /// Release the gate, emitting buffered entries in order. Only the first
    /// call emits anything.
    pub fn flush(&self) -> io::Result<()> {
        let mut state = self.lock();
        if state.released {
            return Ok(());
        }
        state.released = true;

        let buffered = std::mem::take(&mut state.buffer);
        for entry in &buffered {
            state.out.write_all(entry)?;
        }
        state.out.flush()
    }

    /// Whether the gate has been released.
    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    /// Number of entries waiting for release.
    pub fn buffered(&self) -> usize {
        self.lock().buffer.len()
    }
}

/// Writer handed to the `fmt` layer for each event.
pub struct GateWriter {
    gate: LogGate,
}

impl Write for GateWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.gate.write_entry(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.gate.lock();
        if state.released {
            state.out.flush()
        } else {
            Ok(())
        }
    }
}

impl<'a> MakeWriter<'a> for LogGate {
    type Writer = GateWriter;

    fn make_writer(&'a self) -> Self::Writer {
        GateWriter { gate: self.clone() }
    }
}

/// Open the log destination, build the gate and install the subscriber.
pub fn setup_logging(config: &Config, ui: &dyn Ui) -> Result<LogGate, LoggingError> {
    let level = parse_log_level(&config.log_level)?;

    let out: Box<dyn Write + Send> = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::Open {
                    path: path.clone(),
                    source,
                })?;
            Box::new(file)
        }
        None => Box::new(io::stderr()),
    };

    let gate = LogGate::new(out);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(gate.clone()),
        )
        .try_init();

    if installed.is_err() {
        ui.error("WARNING: a log subscriber is already installed; agent logs go to it");
    }

    Ok(gate)
}
