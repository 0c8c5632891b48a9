//! Registry of loaded units and its dependency-observing wrapper

use crate::host::Unit;
use crate::stack::SharedStack;
use std::collections::HashMap;
use std::rc::Rc;

/// Map of loaded units, injected into the host
pub trait Registry {
    /// Fetch a loaded unit
    fn get(&self, name: &str) -> Option<Rc<Unit>>;

    fn contains(&self, name: &str) -> bool;

    /// Register `unit`, returning any unit it replaced
    fn insert(&mut self, unit: Rc<Unit>) -> Option<Rc<Unit>>;

    fn remove(&mut self, name: &str) -> Option<Rc<Unit>>;

    fn names(&self) -> Vec<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Plain in-memory registry
#[derive(Debug, Default)]
pub struct UnitRegistry {
    units: HashMap<String, Rc<Unit>>,
}

impl Registry for UnitRegistry {
    fn get(&self, name: &str) -> Option<Rc<Unit>> {
        self.units.get(name).cloned()
    }

    fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    fn insert(&mut self, unit: Rc<Unit>) -> Option<Rc<Unit>> {
        self.units.insert(unit.name().to_string(), unit)
    }

    fn remove(&mut self, name: &str) -> Option<Rc<Unit>> {
        self.units.remove(name)
    }

    fn names(&self) -> Vec<String> {
        self.units.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.units.len()
    }
}

/// Registry wrapper that reports lookups as dependencies
///
/// A successful `get` adds the looked-up unit to the children of the frame
/// currently loading. This catches units that reuse an already-loaded
/// dependency, which never shows up as a nested load on the stack. Every
/// other operation is forwarded unchanged.
pub struct ObservedRegistry<R> {
    inner: R,
    stack: SharedStack,
}

impl<R: Registry> ObservedRegistry<R> {
    pub fn new(inner: R, stack: SharedStack) -> Self {
        Self { inner, stack }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Registry> Registry for ObservedRegistry<R> {
    fn get(&self, name: &str) -> Option<Rc<Unit>> {
        let unit = self.inner.get(name)?;
        // A borrow can only be outstanding if a reporter looked units up from
        // inside a stack callback; that lookup is not a dependency.
        if let Ok(mut stack) = self.stack.try_borrow_mut() {
            stack.add_child(name);
        }
        Some(unit)
    }

    fn contains(&self, name: &str) -> bool {
        self.inner.contains(name)
    }

    fn insert(&mut self, unit: Rc<Unit>) -> Option<Rc<Unit>> {
        self.inner.insert(unit)
    }

    fn remove(&mut self, name: &str) -> Option<Rc<Unit>> {
        self.inner.remove(name)
    }

    fn names(&self) -> Vec<String> {
        self.inner.names()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
