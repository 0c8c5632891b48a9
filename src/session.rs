//! Instrumentation session
//!
//! Wires one attribution stack into a host: the stack samples through the
//! probe, the host's registry reports lookups to it, and every finder the
//! host uses is intercepted. `scan` then loads root units and everything
//! discovered below them, recording which ones failed.

use crate::config::ScanConfig;
use crate::error::{AttributionError, ConfigError, LoadError};
use crate::filter::UnitFilter;
use crate::host::{FinderChain, Host};
use crate::interceptor::Interceptor;
use crate::memory::{MemoryProbe, Sampler};
use crate::namespace;
use crate::record::{LoadRecord, PersistedRecord};
use crate::registry::{ObservedRegistry, UnitRegistry};
use crate::reporter::MemoryReporter;
use crate::source_tree::{self, TreeFinder};
use crate::stack::{AttributionStack, SharedStack};
use anyhow::{Context, Result};
use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// What a scan loaded and what it could not
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Units newly loaded by the scan, in load order
    pub loaded: Vec<String>,
    /// Failed units with their error kind
    pub failed: BTreeMap<String, &'static str>,
    /// Units skipped because their namespace parent failed or was skipped
    pub skipped: BTreeSet<String>,
    /// Roots rejected by the ignore filter
    pub ignored: Vec<String>,
}

/// One instrumentation run over a unit tree
pub struct Session {
    tree_root: PathBuf,
    stack: SharedStack,
    host: Host,
    filter: UnitFilter,
    reporter: Rc<RefCell<MemoryReporter>>,
}

impl Session {
    /// Calibrate the configured probe and build a session over `tree_root`
    pub fn new(config: &ScanConfig, tree_root: &Path) -> Result<Self> {
        let probe =
            MemoryProbe::calibrate(config.probe.source()).context("Failed to calibrate memory probe")?;
        Ok(Self::with_sampler(config, tree_root, Box::new(probe))?)
    }

    /// Build a session that samples memory through `sampler`
    pub fn with_sampler(
        config: &ScanConfig,
        tree_root: &Path,
        sampler: Box<dyn Sampler>,
    ) -> Result<Self, ConfigError> {
        let filter = config.unit_filter()?;

        let stack = AttributionStack::new(sampler).shared();
        let reporter = Rc::new(RefCell::new(
            MemoryReporter::new(config.threshold_bytes()).with_stream(config.stream),
        ));
        stack
            .borrow_mut()
            .attach_reporter(Box::new(Rc::clone(&reporter)));

        let interceptor = Interceptor::new(Rc::clone(&stack), config.policy);
        let mut finders = FinderChain::intercepted(interceptor);
        finders.push(Rc::new(TreeFinder::new(tree_root)));
        let registry = ObservedRegistry::new(UnitRegistry::default(), Rc::clone(&stack));

        Ok(Self {
            tree_root: tree_root.to_path_buf(),
            stack,
            host: Host::new(finders, Box::new(registry)),
            filter,
            reporter,
        })
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn reporter(&self) -> Ref<'_, MemoryReporter> {
        self.reporter.borrow()
    }

    /// Finished records in finish order
    pub fn records(&self) -> Vec<LoadRecord> {
        self.reporter.borrow().records().to_vec()
    }

    /// Finished records in the persisted JSON shape
    pub fn persisted_records(&self) -> Vec<PersistedRecord> {
        self.reporter
            .borrow()
            .records()
            .iter()
            .map(LoadRecord::to_persisted)
            .collect()
    }

    /// Every top-level unit in the tree
    pub fn all_roots(&self) -> Result<Vec<String>> {
        source_tree::top_level_units(&self.tree_root)
    }

    /// Load `roots` and all units discovered below them
    ///
    /// Load failures are recorded and the scan goes on; only a broken
    /// attribution stack stops it.
    pub fn scan(&self, roots: &[String]) -> Result<ScanOutcome, AttributionError> {
        let mut outcome = ScanOutcome::default();
        let mut loaded_roots = Vec::new();

        for root in roots {
            if !self.filter.allowed(root) {
                tracing::debug!(unit = %root, "ignored");
                outcome.ignored.push(root.clone());
                continue;
            }
            if self.load_unit(root, &mut outcome)? {
                loaded_roots.push(root.as_str());
            }
        }

        for root in loaded_roots {
            let units = match source_tree::discover(&self.tree_root, root) {
                Ok(units) => units,
                Err(err) => {
                    tracing::warn!(unit = root, "discovery failed: {:#}", err);
                    continue;
                }
            };

            for unit in units {
                if !self.filter.allowed(&unit) {
                    outcome.skipped.insert(unit);
                    continue;
                }
                let parent_missing = namespace::parent_of(&unit).is_some_and(|parent| {
                    outcome.failed.contains_key(parent) || outcome.skipped.contains(parent)
                });
                if parent_missing {
                    outcome.skipped.insert(unit);
                    continue;
                }
                self.load_unit(&unit, &mut outcome)?;
            }
        }

        Ok(outcome)
    }

    /// Load one unit; `Ok(false)` when it failed recoverably
    fn load_unit(&self, unit: &str, outcome: &mut ScanOutcome) -> Result<bool, AttributionError> {
        if self.host.is_loaded(unit) {
            return Ok(true);
        }

        let result = match self.host.load(unit) {
            Err(LoadError::Attribution(err)) => return Err(err),
            other => other,
        };

        if let Some(open) = self.stack.borrow().current() {
            return Err(AttributionError::Consistency {
                expected: unit.to_string(),
                found: Some(open.unit.clone()),
            });
        }

        match result {
            Ok(_) => {
                outcome.loaded.push(unit.to_string());
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(unit, kind = err.kind(), "load failed: {}", err);
                outcome.failed.insert(unit.to_string(), err.kind());
                Ok(false)
            }
        }
    }
}
