//! Error types for memory attribution
//!
//! Fatal conditions (`AttributionError`) and recoverable per-unit failures
//! (`LoadError`) are kept apart so the scan loop can decide which ones abort
//! a run.

use thiserror::Error;

/// Errors raised while reading process memory
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("getrusage failed: {0}")]
    Rusage(#[from] nix::errno::Errno),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No VmRSS entry in {0}")]
    MissingField(String),

    #[error("Invalid memory reading: {0}")]
    Parse(String),
}

/// Fatal errors of the attribution stack
///
/// Any of these means later attributions of the same run would be corrupted,
/// so callers must abort instrumentation rather than continue.
#[derive(Error, Debug)]
pub enum AttributionError {
    #[error(
        "Unbalanced exit of unit '{expected}': top of stack is {}",
        describe_top(.found)
    )]
    Consistency {
        expected: String,
        found: Option<String>,
    },

    #[error("Memory probe failed: {0}")]
    Probe(#[from] ProbeError),
}

fn describe_top(found: &Option<String>) -> String {
    match found {
        Some(unit) => format!("'{}'", unit),
        None => "empty".to_string(),
    }
}

/// Errors surfaced by the host while loading a unit
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Unit not found: {0}")]
    NotFound(String),

    #[error("Loading unit '{unit}' failed: {reason}")]
    Failed { unit: String, reason: String },

    #[error(transparent)]
    Attribution(#[from] AttributionError),
}

impl LoadError {
    /// Build a `Failed` error for `unit`
    pub fn failed(unit: impl Into<String>, reason: impl Into<String>) -> Self {
        LoadError::Failed {
            unit: unit.into(),
            reason: reason.into(),
        }
    }

    /// Short error kind used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::NotFound(_) => "UnitNotFound",
            LoadError::Failed { .. } => "LoadFailure",
            LoadError::Attribution(AttributionError::Consistency { .. }) => "ConsistencyError",
            LoadError::Attribution(AttributionError::Probe(_)) => "ProbeError",
        }
    }

    /// Whether the error must abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, LoadError::Attribution(_))
    }
}

/// Errors from scan configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid ignore pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
