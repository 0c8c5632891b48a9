//! Collecting reporter and text report
//!
//! `MemoryReporter` keeps every finished record it is sent and can print a
//! progress line per unit as loads finish.

use crate::memory::mb;
use crate::record::LoadRecord;
use crate::stack::Reporter;
use std::fmt::Write as _;

/// Reporter that keeps finished records for the final report
#[derive(Debug, Default)]
pub struct MemoryReporter {
    threshold: u64,
    stream: bool,
    finished: Vec<LoadRecord>,
}

impl MemoryReporter {
    /// `threshold` is in bytes; records using less are left out of text output
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            stream: false,
            finished: Vec::new(),
        }
    }

    /// Print a progress line to stderr for each finished unit above threshold
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Records in the order they finished
    pub fn records(&self) -> &[LoadRecord] {
        &self.finished
    }

    /// Records ordered by usage, largest first
    pub fn sorted_records(&self) -> Vec<&LoadRecord> {
        let mut records: Vec<&LoadRecord> = self.finished.iter().collect();
        records.sort_by(|a, b| {
            let ka = a.real_usage().max(a.usage());
            let kb = b.real_usage().max(b.usage());
            kb.cmp(&ka).then_with(|| a.unit.cmp(&b.unit))
        });
        records
    }

    /// Top `top` records at or above the threshold, one line each
    pub fn render_report(&self, top: usize) -> String {
        let mut out = String::new();
        for record in self
            .sorted_records()
            .into_iter()
            .filter(|r| r.usage() >= self.threshold)
            .take(top)
        {
            let _ = writeln!(out, "{}", report_line(record));
        }
        out
    }
}

impl Reporter for MemoryReporter {
    fn on_child(&mut self, record: &LoadRecord) {
        tracing::trace!(unit = %record.unit, children = record.children.len(), "child added");
    }

    fn on_import(&mut self, record: &LoadRecord) {
        if self.stream && record.usage() >= self.threshold {
            eprintln!("{}", progress_line(record));
        }
        self.finished.push(record.clone());
    }
}

/// `* unit ------------- 170M     20M    +50M` (memory at exit, inner, self)
pub fn progress_line(record: &LoadRecord) -> String {
    format!(
        "* {:-<60}-{:->5}M {:>6}M {:>6}M",
        format!("{} ", record.unit),
        format!(" {}", mb(record.memory_end)),
        mb(record.memory_inner),
        format!("+{}", mb(record.real_usage()))
    )
}

/// `* unit --------------- 20M    +50M` (inner, self)
pub fn report_line(record: &LoadRecord) -> String {
    format!(
        "* {:-<60}-{:->6}M {:>6}M",
        format!("{} ", record.unit),
        format!(" {}", mb(record.memory_inner)),
        format!("+{}", mb(record.real_usage()))
    )
}
