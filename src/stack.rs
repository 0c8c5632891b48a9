//! Attribution stack of in-flight unit loads
//!
//! Each `enter` pushes a frame with the memory reading at that point; the
//! matching `exit` pops it, takes a second reading and charges the delta to
//! the unit. The frame below (the unit that triggered the load) learns the
//! child's usage as its `memory_inner`, which is how self usage is split from
//! child usage.
//!
//! `memory_inner` is overwritten by every child exit. A unit with several
//! heavy children only has the last one subtracted from its `real_usage`.

use crate::error::AttributionError;
use crate::memory::Sampler;
use crate::record::LoadRecord;
use std::cell::RefCell;
use std::rc::Rc;

/// Receives notifications from the attribution stack
///
/// Both callbacks are best-effort and cannot fail back into the
/// instrumentation path.
pub trait Reporter {
    /// A child edge was added to the active frame
    fn on_child(&mut self, record: &LoadRecord);

    /// A frame finished
    fn on_import(&mut self, record: &LoadRecord);
}

impl<R: Reporter> Reporter for Rc<RefCell<R>> {
    fn on_child(&mut self, record: &LoadRecord) {
        if let Ok(mut inner) = self.try_borrow_mut() {
            inner.on_child(record);
        }
    }

    fn on_import(&mut self, record: &LoadRecord) {
        if let Ok(mut inner) = self.try_borrow_mut() {
            inner.on_import(record);
        }
    }
}

/// Stack handle shared by the interceptor and the observed registry
pub type SharedStack = Rc<RefCell<AttributionStack>>;

/// Call stack of units currently being loaded
pub struct AttributionStack {
    frames: Vec<LoadRecord>,
    sampler: Box<dyn Sampler>,
    reporter: Option<Box<dyn Reporter>>,
}

impl AttributionStack {
    pub fn new(sampler: Box<dyn Sampler>) -> Self {
        Self {
            frames: Vec::new(),
            sampler,
            reporter: None,
        }
    }

    /// Wrap in the shared handle used by one instrumentation session
    pub fn shared(self) -> SharedStack {
        Rc::new(RefCell::new(self))
    }

    pub fn attach_reporter(&mut self, reporter: Box<dyn Reporter>) {
        self.reporter = Some(reporter);
    }

    pub fn detach_reporter(&mut self) -> Option<Box<dyn Reporter>> {
        self.reporter.take()
    }

    /// Number of in-flight loads
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_idle(&self) -> bool {
        self.frames.is_empty()
    }

    /// The frame currently loading, if any
    pub fn current(&self) -> Option<&LoadRecord> {
        self.frames.last()
    }

    /// Start attributing memory to `unit`
    pub fn enter(&mut self, unit: &str) -> Result<(), AttributionError> {
        let memory_begin = self.sampler.sample()?;
        tracing::trace!(unit, memory_begin, depth = self.frames.len(), "enter");
        self.frames.push(LoadRecord::new(unit, memory_begin));
        Ok(())
    }

    /// Finish the frame for `unit`, which must be on top of the stack
    ///
    /// On mismatch nothing is popped and nothing reaches the reporter.
    pub fn exit(&mut self, unit: &str) -> Result<LoadRecord, AttributionError> {
        if self.current().map(|top| top.unit.as_str()) != Some(unit) {
            return Err(self.mismatch(unit));
        }

        let memory_end = self.sampler.sample()?;
        let Some(mut record) = self.frames.pop() else {
            return Err(self.mismatch(unit));
        };
        record.memory_end = memory_end;

        if let Some(parent) = self.frames.last_mut() {
            parent.memory_inner = record.usage();
            record.parent = Some(parent.unit.clone());
        }

        tracing::trace!(
            unit,
            usage = record.usage(),
            real_usage = record.real_usage(),
            "exit"
        );

        if let Some(reporter) = self.reporter.as_mut() {
            reporter.on_import(&record);
        }
        Ok(record)
    }

    fn mismatch(&self, unit: &str) -> AttributionError {
        AttributionError::Consistency {
            expected: unit.to_string(),
            found: self.current().map(|r| r.unit.clone()),
        }
    }

    /// Record that the active frame depends on `child`
    pub fn add_child(&mut self, child: &str) {
        let Some(top) = self.frames.last_mut() else {
            return;
        };
        if top.unit == child {
            return;
        }
        if top.children.insert(child.to_string()) {
            tracing::trace!(unit = %top.unit, child, "dependency");
        }
        if let Some(reporter) = self.reporter.as_mut() {
            reporter.on_child(top);
        }
    }
}

impl std::fmt::Debug for AttributionStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributionStack")
            .field("frames", &self.frames)
            .field("reporter", &self.reporter.is_some())
            .finish()
    }
}
