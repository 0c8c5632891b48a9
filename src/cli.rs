//! CLI argument parsing for loadmeter

use crate::config::ScanConfig;
use crate::interceptor::FailurePolicy;
use crate::memory::ProbeKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Format for saved records
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SaveFormat {
    /// JSON snapshot, readable by `loadmeter graph`
    Json,
    /// CSV table of usage in MB
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "loadmeter")]
#[command(version)]
#[command(about = "Who eats memory? Per-unit memory attribution for hierarchical loads", long_about = None)]
pub struct Cli {
    /// Enable debug tracing to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load units from a unit tree and attribute memory to each
    Scan(ScanArgs),
    /// Merge a saved JSON snapshot and render it as a Graphviz graph
    Graph(GraphArgs),
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Directory holding the unit tree
    #[arg(long, value_name = "DIR")]
    pub root: PathBuf,

    /// Top-level units to check, comma or space separated ("all" for every unit)
    #[arg(long, value_name = "UNITS", default_value = "all")]
    pub units: String,

    /// Ignore units matching this shell pattern (repeatable)
    #[arg(long = "ignore", value_name = "PATTERN")]
    pub ignore: Vec<String>,

    /// Only report units using at least this many MB
    #[arg(long, value_name = "MB")]
    pub threshold: Option<u64>,

    /// Show the top N units
    #[arg(long, value_name = "N")]
    pub top: Option<usize>,

    /// Save per-unit records to a file ("-" for stdout)
    #[arg(long = "save-to", value_name = "PATH")]
    pub save_to: Option<String>,

    /// Format for --save-to
    #[arg(long, value_enum, default_value = "json")]
    pub format: SaveFormat,

    /// What happens when a unit fails to load
    #[arg(long, value_enum)]
    pub policy: Option<FailurePolicy>,

    /// Memory source
    #[arg(long, value_enum)]
    pub probe: Option<ProbeKind>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Do not print a line per finished unit while scanning
    #[arg(short, long)]
    pub quiet: bool,
}

impl ScanArgs {
    /// Requested root units, `None` for all
    pub fn unit_list(&self) -> Option<Vec<String>> {
        if self.units.trim().eq_ignore_ascii_case("all") {
            return None;
        }
        Some(
            self.units
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Override `config` with flags given on the command line
    pub fn apply_to(&self, config: &mut ScanConfig) {
        if let Some(threshold) = self.threshold {
            config.threshold_mb = threshold;
        }
        if let Some(top) = self.top {
            config.top = top;
        }
        if let Some(policy) = self.policy {
            config.policy = policy;
        }
        if let Some(probe) = self.probe {
            config.probe = probe;
        }
        config.ignore.extend(self.ignore.iter().cloned());
        if self.quiet {
            config.stream = false;
        }
    }
}

#[derive(Args, Debug)]
pub struct GraphArgs {
    /// JSON snapshot written by `scan --save-to`
    #[arg(value_name = "RECORDS")]
    pub input: PathBuf,

    /// Where to write the DOT graph ("-" or omitted for stdout)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<String>,

    /// Also write the merged records as JSON
    #[arg(long, value_name = "PATH")]
    pub merged: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_args(args: &[&str]) -> ScanArgs {
        let mut argv = vec!["loadmeter", "scan"];
        argv.extend_from_slice(args);
        match Cli::parse_from(argv).command {
            Command::Scan(args) => args,
            other => panic!("expected scan, got {:?}", other),
        }
    }

    #[test]
    fn test_scan_defaults() {
        let args = scan_args(&["--root", "units"]);
        assert_eq!(args.root, PathBuf::from("units"));
        assert_eq!(args.unit_list(), None);
        assert_eq!(args.format, SaveFormat::Json);
        assert!(args.save_to.is_none());
        assert!(!args.quiet);
    }

    #[test]
    fn test_unit_list_splits_commas_and_spaces() {
        let args = scan_args(&["--root", "u", "--units", "a,b c,,d"]);
        assert_eq!(
            args.unit_list(),
            Some(vec![
                "a".to_string(),
                "b".to_string(),
                "c".to_string(),
                "d".to_string()
            ])
        );
    }

    #[test]
    fn test_unit_list_all_is_case_insensitive() {
        let args = scan_args(&["--root", "u", "--units", "ALL"]);
        assert_eq!(args.unit_list(), None);
    }

    #[test]
    fn test_flags_override_config() {
        let args = scan_args(&[
            "--root",
            "u",
            "--threshold",
            "0",
            "--top",
            "3",
            "--policy",
            "propagate",
            "--probe",
            "resident",
            "--ignore",
            "x.*",
            "--ignore",
            "y",
            "-q",
        ]);
        let mut config = ScanConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config.threshold_mb, 0);
        assert_eq!(config.top, 3);
        assert_eq!(config.policy, FailurePolicy::Propagate);
        assert_eq!(config.probe, ProbeKind::Resident);
        assert_eq!(config.ignore, vec!["x.*", "y"]);
        assert!(!config.stream);
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let args = scan_args(&["--root", "u"]);
        let mut config = ScanConfig {
            top: 7,
            ..ScanConfig::default()
        };
        args.apply_to(&mut config);
        assert_eq!(config.top, 7);
        assert!(config.stream);
    }

    #[test]
    fn test_graph_args() {
        let cli = Cli::parse_from(["loadmeter", "--debug", "graph", "rec.json", "-o", "g.dot"]);
        assert!(cli.debug);
        match cli.command {
            Command::Graph(args) => {
                assert_eq!(args.input, PathBuf::from("rec.json"));
                assert_eq!(args.output.as_deref(), Some("g.dot"));
                assert!(args.merged.is_none());
            }
            other => panic!("expected graph, got {:?}", other),
        }
    }

    #[test]
    fn test_scan_requires_root() {
        assert!(Cli::try_parse_from(["loadmeter", "scan"]).is_err());
    }
}
