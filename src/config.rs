//! Scan configuration
//!
//! Values come from `Default`, optionally overridden by a TOML file, then by
//! command-line flags.
//!
//! ```toml
//! threshold_mb = 2
//! top = 50
//! policy = "propagate"
//! probe = "resident"
//! ignore = ["vendor.*", "*.fixtures"]
//! default_ignore = true
//! ```

use crate::error::ConfigError;
use crate::filter::{UnitFilter, DEFAULT_IGNORE};
use crate::interceptor::FailurePolicy;
use crate::memory::ProbeKind;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Settings for one scan
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Records using less than this many MiB are left out of text reports
    pub threshold_mb: u64,
    /// Number of records in the final report
    pub top: usize,
    /// How intercepted loaders handle load failures
    pub policy: FailurePolicy,
    /// Memory source
    pub probe: ProbeKind,
    /// Extra ignore patterns
    pub ignore: Vec<String>,
    /// Whether `DEFAULT_IGNORE` applies
    pub default_ignore: bool,
    /// Print a line per finished unit while scanning
    pub stream: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threshold_mb: 1,
            top: 100,
            policy: FailurePolicy::Swallow,
            probe: ProbeKind::Maxrss,
            ignore: Vec::new(),
            default_ignore: true,
            stream: true,
        }
    }
}

impl ScanConfig {
    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML scan configuration")
    }

    pub fn threshold_bytes(&self) -> u64 {
        self.threshold_mb.saturating_mul(1024 * 1024)
    }

    /// All ignore patterns in effect, defaults first
    pub fn ignore_patterns(&self) -> Vec<String> {
        let defaults: &[&str] = if self.default_ignore {
            DEFAULT_IGNORE
        } else {
            &[]
        };
        defaults
            .iter()
            .map(|p| p.to_string())
            .chain(self.ignore.iter().cloned())
            .collect()
    }

    pub fn unit_filter(&self) -> Result<UnitFilter, ConfigError> {
        UnitFilter::from_patterns(self.ignore_patterns())
    }
}
