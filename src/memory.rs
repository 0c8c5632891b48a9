//! Process memory sampling
//!
//! A `MemoryProbe` reads the resident memory of the current process and
//! normalizes it to bytes. The OS unit is not reported anywhere, so the probe
//! calibrates itself from its first reading: a value below
//! [`KILOBYTE_SCALE_THRESHOLD`] raw units is taken to be kilobytes (Linux
//! reports `ru_maxrss` in KiB), anything else is taken to be bytes (macOS).
//!
//! This is a heuristic, not unit detection. A process that already holds more
//! than ~500 MiB when calibrated on Linux, or a tiny process on an OS that
//! reports bytes, will be misclassified.

use crate::error::ProbeError;
use serde::Deserialize;
use std::fs;

/// Baseline readings below this many raw units are assumed to be kilobytes
pub const KILOBYTE_SCALE_THRESHOLD: u64 = 500 * 1024;

const PROC_STATUS: &str = "/proc/self/status";

/// Convert bytes to whole MiB, rounded to nearest
pub fn mb(bytes: u64) -> u64 {
    (bytes + (1 << 19)) >> 20
}

/// A raw memory reading in OS-specific units
pub trait MemorySource {
    fn read_raw(&self) -> Result<u64, ProbeError>;
}

/// Peak resident set size from `getrusage(RUSAGE_SELF)`
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxRss;

impl MemorySource for MaxRss {
    fn read_raw(&self) -> Result<u64, ProbeError> {
        use nix::sys::resource::{getrusage, UsageWho};

        let usage = getrusage(UsageWho::RUSAGE_SELF)?;
        Ok(usage.max_rss().max(0) as u64)
    }
}

/// Current resident set size from `/proc/self/status` (Linux only, KiB)
#[derive(Debug, Clone, Copy, Default)]
pub struct Resident;

impl MemorySource for Resident {
    fn read_raw(&self) -> Result<u64, ProbeError> {
        let content = fs::read_to_string(PROC_STATUS).map_err(|source| ProbeError::Io {
            path: PROC_STATUS.to_string(),
            source,
        })?;
        parse_vm_rss(&content)
    }
}

/// Extract the `VmRSS` value (in kB) from a `/proc/<pid>/status` dump
pub fn parse_vm_rss(status: &str) -> Result<u64, ProbeError> {
    let line = status
        .lines()
        .find(|l| l.starts_with("VmRSS:"))
        .ok_or_else(|| ProbeError::MissingField(PROC_STATUS.to_string()))?;

    let value = line["VmRSS:".len()..]
        .split_whitespace()
        .next()
        .ok_or_else(|| ProbeError::Parse(line.to_string()))?;

    value
        .parse::<u64>()
        .map_err(|_| ProbeError::Parse(line.to_string()))
}

/// Which memory source a probe reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// Peak resident set size (getrusage)
    #[default]
    Maxrss,
    /// Current resident set size (/proc/self/status)
    Resident,
}

impl ProbeKind {
    pub fn source(self) -> Box<dyn MemorySource> {
        match self {
            ProbeKind::Maxrss => Box::new(MaxRss),
            ProbeKind::Resident => Box::new(Resident),
        }
    }
}

/// Something that yields memory readings in bytes
///
/// The attribution stack samples through this trait so tests can script
/// readings.
pub trait Sampler {
    fn sample(&mut self) -> Result<u64, ProbeError>;
}

/// Calibrated memory probe
pub struct MemoryProbe {
    source: Box<dyn MemorySource>,
    scale: u64,
}

impl MemoryProbe {
    /// Take a baseline reading from `source` and pick the unit scale
    pub fn calibrate(source: Box<dyn MemorySource>) -> Result<Self, ProbeError> {
        let baseline = source.read_raw()?;
        let scale = scale_for_baseline(baseline);
        tracing::debug!(baseline, scale, "calibrated memory probe");
        Ok(Self { source, scale })
    }

    /// Build a probe with a known scale, skipping calibration
    pub fn with_scale(source: Box<dyn MemorySource>, scale: u64) -> Self {
        Self { source, scale }
    }

    /// Multiplier applied to raw readings
    pub fn scale(&self) -> u64 {
        self.scale
    }

    /// Current memory in bytes
    pub fn read_bytes(&self) -> Result<u64, ProbeError> {
        Ok(self.source.read_raw()?.saturating_mul(self.scale))
    }
}

impl Sampler for MemoryProbe {
    fn sample(&mut self) -> Result<u64, ProbeError> {
        self.read_bytes()
    }
}

impl std::fmt::Debug for MemoryProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryProbe")
            .field("scale", &self.scale)
            .finish_non_exhaustive()
    }
}

fn scale_for_baseline(baseline: u64) -> u64 {
    if baseline < KILOBYTE_SCALE_THRESHOLD {
        1024
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FixedSource(Cell<u64>);

    impl MemorySource for FixedSource {
        fn read_raw(&self) -> Result<u64, ProbeError> {
            Ok(self.0.get())
        }
    }

    #[test]
    fn test_mb_rounds_to_nearest() {
        assert_eq!(mb(0), 0);
        assert_eq!(mb(1024 * 1024), 1);
        assert_eq!(mb(1024 * 1024 + 600 * 1024), 2);
        assert_eq!(mb(1024 * 1024 + 400 * 1024), 1);
    }

    #[test]
    fn test_small_baseline_is_kilobytes() {
        let probe = MemoryProbe::calibrate(Box::new(FixedSource(Cell::new(20_000)))).unwrap();
        assert_eq!(probe.scale(), 1024);
        assert_eq!(probe.read_bytes().unwrap(), 20_000 * 1024);
    }

    #[test]
    fn test_large_baseline_is_bytes() {
        let probe =
            MemoryProbe::calibrate(Box::new(FixedSource(Cell::new(30 * 1024 * 1024)))).unwrap();
        assert_eq!(probe.scale(), 1);
    }

    #[test]
    fn test_threshold_boundary() {
        assert_eq!(scale_for_baseline(KILOBYTE_SCALE_THRESHOLD - 1), 1024);
        assert_eq!(scale_for_baseline(KILOBYTE_SCALE_THRESHOLD), 1);
    }

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tcat\nVmPeak:\t  8000 kB\nVmRSS:\t    1234 kB\nThreads:\t1\n";
        assert_eq!(parse_vm_rss(status).unwrap(), 1234);
    }

    #[test]
    fn test_parse_vm_rss_missing() {
        assert!(matches!(
            parse_vm_rss("Name:\tcat\n"),
            Err(ProbeError::MissingField(_))
        ));
        assert!(matches!(
            parse_vm_rss("VmRSS:\tlots kB\n"),
            Err(ProbeError::Parse(_))
        ));
    }

    #[test]
    fn test_maxrss_reads_nonzero() {
        let probe = MemoryProbe::calibrate(ProbeKind::Maxrss.source()).unwrap();
        assert!(probe.read_bytes().unwrap() > 0);
    }
}
