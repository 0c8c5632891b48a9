//! Merging persisted records into an attribution graph
//!
//! A snapshot can hold several records for the same unit (a unit reloaded,
//! or loaded in several runs). Merging produces one node per unit:
//!
//! 1. records sharing a unit are grouped: children are unioned, `usage` and
//!    `real_usage` summed, the first-seen `parent` kept;
//! 2. a unit is dropped from its parent's children, since the parent link
//!    already draws that edge;
//! 3. each unit's children lose itself, its parent and anything in a dotted
//!    ancestor/descendant relation with it.
//!
//! The result is returned sorted by unit name. Callers should not depend on
//! that order.

use crate::json_output;
use crate::namespace;
use crate::record::PersistedRecord;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// One node of the attribution graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRecord {
    pub unit: String,
    pub parent: Option<String>,
    /// Sorted, deduplicated dependency edges
    pub children: Vec<String>,
    pub usage: u64,
    pub real_usage: u64,
}

impl From<GraphRecord> for PersistedRecord {
    fn from(record: GraphRecord) -> Self {
        PersistedRecord {
            unit: record.unit,
            parent: record.parent,
            children: record.children,
            usage: record.usage,
            real_usage: record.real_usage,
        }
    }
}

#[derive(Debug)]
struct Group {
    parent: Option<String>,
    children: BTreeSet<String>,
    usage: u64,
    real_usage: u64,
}

/// Merge raw records into one `GraphRecord` per unit
pub fn merge<I>(records: I) -> Vec<GraphRecord>
where
    I: IntoIterator<Item = PersistedRecord>,
{
    let mut groups: BTreeMap<String, Group> = BTreeMap::new();

    for record in records {
        match groups.get_mut(&record.unit) {
            Some(group) => {
                group.children.extend(record.children);
                group.usage = group.usage.saturating_add(record.usage);
                group.real_usage = group.real_usage.saturating_add(record.real_usage);
            }
            None => {
                groups.insert(
                    record.unit,
                    Group {
                        parent: record.parent,
                        children: record.children.into_iter().collect(),
                        usage: record.usage,
                        real_usage: record.real_usage,
                    },
                );
            }
        }
    }

    let parent_links: Vec<(String, String)> = groups
        .iter()
        .filter_map(|(unit, g)| g.parent.clone().map(|p| (unit.clone(), p)))
        .collect();
    for (unit, parent) in &parent_links {
        if let Some(parent_group) = groups.get_mut(parent) {
            parent_group.children.remove(unit);
        }
    }

    groups
        .into_iter()
        .map(|(unit, group)| {
            let children = group
                .children
                .into_iter()
                .filter(|child| {
                    !namespace::overlaps(&unit, child) && group.parent.as_ref() != Some(child)
                })
                .collect();
            GraphRecord {
                unit,
                parent: group.parent,
                children,
                usage: group.usage,
                real_usage: group.real_usage,
            }
        })
        .collect()
}

/// Read a JSON snapshot and merge it
pub fn merge_file<P: AsRef<Path>>(path: P) -> Result<Vec<GraphRecord>> {
    let records = json_output::read_records(path)?;
    let raw = records.len();
    let merged = merge(records);
    tracing::debug!(raw, merged = merged.len(), "merged records");
    Ok(merged)
}
