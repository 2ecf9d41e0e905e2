//! Check types and health check records.

use serde::{Deserialize, Serialize};

/// Status reported by a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passing,
    Warning,
    Critical,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Passing => write!(f, "passing"),
            CheckStatus::Warning => write!(f, "warning"),
            CheckStatus::Critical => write!(f, "critical"),
        }
    }
}

/// How a check is evaluated.
///
/// Exactly one flavour must be configured: a TTL check, a script run every
/// `interval_secs`, or an HTTP request run every `interval_secs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CheckType {
    /// Command line to run periodically.
    pub script: String,

    /// URL requested periodically.
    pub http: String,

    /// Interval between script/HTTP runs in seconds.
    pub interval_secs: u64,

    /// Time-to-live in seconds; the check turns critical when not refreshed.
    pub ttl_secs: u64,

    /// Timeout for a single HTTP check request in seconds (0 = engine default).
    pub timeout_secs: u64,
}

impl CheckType {
    /// A TTL check.
    pub fn is_ttl(&self) -> bool {
        self.ttl_secs > 0
    }

    /// A script check run on an interval.
    pub fn is_script(&self) -> bool {
        !self.script.is_empty() && self.interval_secs > 0
    }

    /// An HTTP check run on an interval.
    pub fn is_http(&self) -> bool {
        !self.http.is_empty() && self.interval_secs > 0
    }

    /// True when exactly one check flavour is configured.
    pub fn is_valid(&self) -> bool {
        let flavours = [self.is_ttl(), self.is_script(), self.is_http()];
        flavours.iter().filter(|f| **f).count() == 1
    }

    /// True when nothing at all was configured.
    pub fn is_empty(&self) -> bool {
        *self == CheckType::default()
    }
}

/// Runtime health check record owned by a node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HealthCheck {
    pub node: String,
    pub check_id: String,
    pub name: String,
    pub status: CheckStatus,
    pub notes: String,
    pub output: String,
    pub service_id: String,
    pub service_name: String,
}
