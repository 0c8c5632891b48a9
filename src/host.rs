//! Host loading subsystem
//!
//! The host resolves dotted unit names through an ordered chain of
//! [`Finder`]s, registers each unit in an injected [`Registry`] before running
//! its [`Loader`], and serves already-loaded units straight from the registry.
//! Loading a unit always loads its namespace parent first.
//!
//! Instrumentation plugs in at two seams: the finder chain routes every finder
//! through an [`Interceptor`], and the registry can be an
//! [`ObservedRegistry`](crate::registry::ObservedRegistry).

use crate::error::LoadError;
use crate::interceptor::Interceptor;
use crate::namespace;
use crate::registry::Registry;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A loaded (or loading) unit
#[derive(Debug)]
pub struct Unit {
    name: String,
    origin: Option<PathBuf>,
    retained: RefCell<Vec<Vec<u8>>>,
}

impl Unit {
    pub fn new(name: impl Into<String>, origin: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            origin,
            retained: RefCell::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// Keep `bytes` alive for as long as the unit is loaded
    pub fn retain(&self, bytes: Vec<u8>) {
        self.retained.borrow_mut().push(bytes);
    }

    /// Total bytes kept alive by this unit
    pub fn retained_bytes(&self) -> usize {
        self.retained.borrow().iter().map(Vec::len).sum()
    }
}

/// Result of a successful `locate`
#[derive(Clone)]
pub struct Located {
    pub loader: Rc<dyn Loader>,
    pub origin: Option<PathBuf>,
}

/// Capability: find the loader for a unit name
pub trait Finder {
    fn locate(&self, name: &str) -> Option<Located>;

    /// Tag carried by instrumentation adapters so they are never stacked
    fn is_intercepted(&self) -> bool {
        false
    }
}

/// Capability: materialize a unit
///
/// The unit is already registered when `materialize` runs; dependencies are
/// loaded through `host`.
pub trait Loader {
    fn materialize(&self, unit: &Unit, host: &Host) -> Result<(), LoadError>;

    /// Tag carried by instrumentation adapters so they are never stacked
    fn is_intercepted(&self) -> bool {
        false
    }
}

/// Ordered finder list
///
/// With an interceptor attached, every finder added through any method is
/// wrapped on the way in.
#[derive(Default)]
pub struct FinderChain {
    finders: Vec<Rc<dyn Finder>>,
    interceptor: Option<Interceptor>,
}

impl FinderChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain that wraps finders with `interceptor`
    pub fn intercepted(interceptor: Interceptor) -> Self {
        Self {
            finders: Vec::new(),
            interceptor: Some(interceptor),
        }
    }

    fn admit(&self, finder: Rc<dyn Finder>) -> Rc<dyn Finder> {
        match &self.interceptor {
            Some(interceptor) => interceptor.wrap_finder(finder),
            None => finder,
        }
    }

    pub fn push(&mut self, finder: Rc<dyn Finder>) {
        let finder = self.admit(finder);
        self.finders.push(finder);
    }

    pub fn insert(&mut self, index: usize, finder: Rc<dyn Finder>) {
        let finder = self.admit(finder);
        self.finders.insert(index, finder);
    }

    /// Replace the finder at `index`; returns `false` when out of range
    pub fn set(&mut self, index: usize, finder: Rc<dyn Finder>) -> bool {
        let finder = self.admit(finder);
        match self.finders.get_mut(index) {
            Some(slot) => {
                *slot = finder;
                true
            }
            None => false,
        }
    }

    pub fn extend<I: IntoIterator<Item = Rc<dyn Finder>>>(&mut self, finders: I) {
        for finder in finders {
            self.push(finder);
        }
    }

    pub fn len(&self) -> usize {
        self.finders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.finders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<dyn Finder>> {
        self.finders.iter()
    }
}

/// The loading subsystem
pub struct Host {
    finders: RefCell<FinderChain>,
    registry: RefCell<Box<dyn Registry>>,
}

impl Host {
    pub fn new(finders: FinderChain, registry: Box<dyn Registry>) -> Self {
        Self {
            finders: RefCell::new(finders),
            registry: RefCell::new(registry),
        }
    }

    /// Append a finder to the chain
    pub fn add_finder(&self, finder: Rc<dyn Finder>) {
        self.finders.borrow_mut().push(finder);
    }

    /// Whether `name` is registered, without counting as a dependency lookup
    pub fn is_loaded(&self, name: &str) -> bool {
        self.registry.borrow().contains(name)
    }

    /// Names of all registered units, sorted
    pub fn loaded_names(&self) -> Vec<String> {
        let mut names = self.registry.borrow().names();
        names.sort();
        names
    }

    /// Look up a registered unit; counts as a dependency of the loading unit
    pub fn lookup(&self, name: &str) -> Option<Rc<Unit>> {
        self.registry.borrow().get(name)
    }

    /// Load `name`, or return it if already registered
    pub fn load(&self, name: &str) -> Result<Rc<Unit>, LoadError> {
        if let Some(unit) = self.lookup(name) {
            return Ok(unit);
        }

        if let Some(parent) = namespace::parent_of(name) {
            self.load(parent)?;
            if let Some(unit) = self.lookup(name) {
                return Ok(unit);
            }
        }

        let located = self
            .locate(name)
            .ok_or_else(|| LoadError::NotFound(name.to_string()))?;

        let unit = Rc::new(Unit::new(name, located.origin));
        self.registry.borrow_mut().insert(Rc::clone(&unit));
        tracing::debug!(unit = name, "materializing");

        if let Err(err) = located.loader.materialize(&unit, self) {
            self.registry.borrow_mut().remove(name);
            return Err(err);
        }

        // The loader may have replaced its registry entry
        Ok(self.lookup(name).unwrap_or(unit))
    }

    fn locate(&self, name: &str) -> Option<Located> {
        let finders: Vec<Rc<dyn Finder>> = self.finders.borrow().iter().cloned().collect();
        finders.iter().find_map(|finder| finder.locate(name))
    }
}
