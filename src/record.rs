//! Load records produced by the attribution stack

use crate::memory::mb;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// One attempt to load a unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadRecord {
    /// Dotted unit identifier
    pub unit: String,
    /// Unit whose load directly triggered this one
    pub parent: Option<String>,
    /// Units this one loaded or consulted
    pub children: HashSet<String>,
    /// Memory in bytes at enter
    pub memory_begin: u64,
    /// Memory in bytes at exit
    pub memory_end: u64,
    /// Usage of the most recently completed child load
    pub memory_inner: u64,
}

impl LoadRecord {
    pub fn new(unit: impl Into<String>, memory_begin: u64) -> Self {
        Self {
            unit: unit.into(),
            memory_begin,
            ..Default::default()
        }
    }

    /// Bytes consumed between enter and exit, clamped at zero
    pub fn usage(&self) -> u64 {
        self.memory_end.saturating_sub(self.memory_begin)
    }

    /// Usage minus the last child's usage, clamped at zero
    pub fn real_usage(&self) -> u64 {
        self.usage().saturating_sub(self.memory_inner)
    }

    /// Snapshot in the persisted JSON shape
    pub fn to_persisted(&self) -> PersistedRecord {
        let mut children: Vec<String> = self.children.iter().cloned().collect();
        children.sort();
        PersistedRecord {
            unit: self.unit.clone(),
            parent: self.parent.clone(),
            children,
            usage: self.usage(),
            real_usage: self.real_usage(),
        }
    }
}

impl fmt::Display for LoadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut children: Vec<&str> = self.children.iter().map(String::as_str).collect();
        children.sort_unstable();
        write!(
            f,
            "<LoadRecord {} {}M/{}M parent={} children=[{}]>",
            self.unit,
            mb(self.real_usage()),
            mb(self.usage()),
            self.parent.as_deref().unwrap_or("-"),
            children.join(", ")
        )
    }
}

/// A finished record as written to and read from JSON snapshots
///
/// Usage values are bytes. Snapshots written by older tooling name the unit
/// field `module`; it is accepted on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    #[serde(alias = "module")]
    pub unit: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    pub usage: u64,
    pub real_usage: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_usage_and_real_usage() {
        let record = LoadRecord {
            memory_begin: 100 * MB,
            memory_end: 170 * MB,
            memory_inner: 20 * MB,
            ..LoadRecord::new("pkgA", 0)
        };
        assert_eq!(record.usage(), 70 * MB);
        assert_eq!(record.real_usage(), 50 * MB);
    }

    #[test]
    fn test_usage_clamped_when_memory_drops() {
        let mut record = LoadRecord::new("a", 10 * MB);
        record.memory_end = 5 * MB;
        assert_eq!(record.usage(), 0);
        assert_eq!(record.real_usage(), 0);
    }

    #[test]
    fn test_real_usage_clamped_when_inner_exceeds_usage() {
        let mut record = LoadRecord::new("a", 0);
        record.memory_end = 3 * MB;
        record.memory_inner = 9 * MB;
        assert_eq!(record.real_usage(), 0);
    }

    #[test]
    fn test_display_shows_mb() {
        let mut record = LoadRecord::new("a.b", 0);
        record.memory_end = 2 * MB;
        record.parent = Some("a".to_string());
        record.children.insert("z".to_string());
        assert_eq!(
            record.to_string(),
            "<LoadRecord a.b 2M/2M parent=a children=[z]>"
        );
    }

    #[test]
    fn test_persisted_children_sorted() {
        let mut record = LoadRecord::new("a", 0);
        record.children.extend(["c".to_string(), "b".to_string()]);
        assert_eq!(record.to_persisted().children, vec!["b", "c"]);
    }

    #[test]
    fn test_persisted_accepts_module_key() {
        let json = r#"{"module": "x", "parent": null, "children": ["y"], "usage": 5, "real_usage": 4}"#;
        let record: PersistedRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.unit, "x");
        assert_eq!(record.children, vec!["y"]);
    }
}
