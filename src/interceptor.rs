//! Load interception
//!
//! Adapters around the host's [`Finder`] and [`Loader`] capabilities that
//! bracket every materialization with attribution stack `enter`/`exit`
//! calls. Callers see the same results as from the wrapped objects, except
//! that [`FailurePolicy::Swallow`] turns recoverable load failures into
//! success.

use crate::error::LoadError;
use crate::host::{Finder, Host, Loader, Located, Unit};
use crate::stack::SharedStack;
use serde::Deserialize;
use std::rc::Rc;

/// What an intercepted loader does when materialization fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure, close the frame and report success
    #[default]
    Swallow,
    /// Close the frame, then return the failure to the caller
    Propagate,
}

/// Wraps finders and loaders for one attribution stack
#[derive(Clone)]
pub struct Interceptor {
    stack: SharedStack,
    policy: FailurePolicy,
}

impl Interceptor {
    pub fn new(stack: SharedStack, policy: FailurePolicy) -> Self {
        Self { stack, policy }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Wrap `finder` unless it is already intercepted
    pub fn wrap_finder(&self, finder: Rc<dyn Finder>) -> Rc<dyn Finder> {
        if finder.is_intercepted() {
            return finder;
        }
        Rc::new(InterceptedFinder {
            inner: finder,
            interceptor: self.clone(),
        })
    }

    /// Wrap `loader` unless it is already intercepted
    pub fn wrap_loader(&self, loader: Rc<dyn Loader>) -> Rc<dyn Loader> {
        if loader.is_intercepted() {
            return loader;
        }
        Rc::new(InterceptedLoader {
            inner: loader,
            stack: self.stack.clone(),
            policy: self.policy,
        })
    }
}

/// Finder adapter whose located loaders are intercepted
pub struct InterceptedFinder {
    inner: Rc<dyn Finder>,
    interceptor: Interceptor,
}

impl Finder for InterceptedFinder {
    fn locate(&self, name: &str) -> Option<Located> {
        let located = self.inner.locate(name)?;
        Some(Located {
            loader: self.interceptor.wrap_loader(located.loader),
            origin: located.origin,
        })
    }

    fn is_intercepted(&self) -> bool {
        true
    }
}

/// Loader adapter that brackets `materialize` with enter/exit
pub struct InterceptedLoader {
    inner: Rc<dyn Loader>,
    stack: SharedStack,
    policy: FailurePolicy,
}

impl Loader for InterceptedLoader {
    fn materialize(&self, unit: &Unit, host: &Host) -> Result<(), LoadError> {
        let name = unit.name();
        self.stack.borrow_mut().enter(name)?;

        let outcome = self.inner.materialize(unit, host);
        let exited = self.stack.borrow_mut().exit(name);

        match outcome {
            Ok(()) => {
                exited?;
                Ok(())
            }
            // The stack is already inconsistent; the inner error is the cause
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                exited?;
                match self.policy {
                    FailurePolicy::Swallow => {
                        tracing::warn!(unit = name, kind = err.kind(), "load error ignored: {}", err);
                        Ok(())
                    }
                    FailurePolicy::Propagate => Err(err),
                }
            }
        }
    }

    fn is_intercepted(&self) -> bool {
        true
    }
}
