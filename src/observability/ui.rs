//! Operator-facing console output.
//!
//! Output and errors are prefixed with `==> `, info lines are indented. This
//! is separate from streamed logs, which go through the log gate.

use std::io::Write;
use std::sync::{Arc, Mutex};

/// Console the orchestrator reports to.
pub trait Ui: Send + Sync {
    /// A headline message.
    fn output(&self, message: &str);

    /// A detail line.
    fn info(&self, message: &str);

    /// An error or warning.
    fn error(&self, message: &str);
}

/// A [`Ui`] writing prefixed lines to a writer.
pub struct PrefixedUi {
    out: Mutex<Box<dyn Write + Send>>,
}

impl PrefixedUi {
    pub const OUTPUT_PREFIX: &'static str = "==> ";
    pub const INFO_PREFIX: &'static str = "    ";
    pub const ERROR_PREFIX: &'static str = "==> ";

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out: Mutex::new(out) }
    }

    /// Console UI on stdout.
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn write_line(&self, prefix: &str, message: &str) {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Console writes are best effort
        let _ = writeln!(out, "{}{}", prefix, message);
        let _ = out.flush();
    }
}

impl Ui for PrefixedUi {
    fn output(&self, message: &str) {
        self.write_line(Self::OUTPUT_PREFIX, message);
    }

    fn info(&self, message: &str) {
        self.write_line(Self::INFO_PREFIX, message);
    }

    fn error(&self, message: &str) {
        self.write_line(Self::ERROR_PREFIX, message);
    }
}

/// An in-memory [`Ui`] that records every line, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct CapturedUi {
    lines: Arc<Mutex<Vec<UiLine>>>,
}

/// A line recorded by [`CapturedUi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiLine {
    Output(String),
    Info(String),
    Error(String),
}

impl UiLine {
    pub fn text(&self) -> &str {
        match self {
            UiLine::Output(s) | UiLine::Info(s) | UiLine::Error(s) => s,
        }
    }
}

impl CapturedUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<UiLine> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn errors(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter_map(|line| match line {
                UiLine::Error(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    fn push(&self, line: UiLine) {
        match self.lines.lock() {
            Ok(mut lines) => lines.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }
}

impl Ui for CapturedUi {
    fn output(&self, message: &str) {
        self.push(UiLine::Output(message.to_string()));
    }

    fn info(&self, message: &str) {
        self.push(UiLine::Info(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.push(UiLine::Error(message.to_string()));
    }
}
