//! Property-based tests for attribution, merging and filtering
//!
//! Core properties covered:
//! 1. Self usage never exceeds total usage
//! 2. Merging sums usage per unit and is idempotent
//! 3. Merged child edges never point into the unit's own namespace or at its parent
//! 4. Balanced enter/exit sequences always unwind the stack
//! 5. Ignore patterns never panic

use loadmeter::error::ProbeError;
use loadmeter::filter::UnitFilter;
use loadmeter::memory::Sampler;
use loadmeter::merge::merge;
use loadmeter::namespace;
use loadmeter::record::{LoadRecord, PersistedRecord};
use loadmeter::stack::AttributionStack;
use proptest::prelude::*;
use std::collections::HashMap;

fn unit_name() -> impl Strategy<Value = String> {
    "[abc](\\.[abc]){0,2}"
}

fn persisted_record() -> impl Strategy<Value = PersistedRecord> {
    (
        unit_name(),
        prop::option::of(unit_name()),
        prop::collection::vec(unit_name(), 0..4),
        0u64..1 << 32,
        0u64..1 << 32,
    )
        .prop_map(|(unit, parent, children, usage, inner)| PersistedRecord {
            unit,
            parent,
            children,
            usage,
            real_usage: usage.saturating_sub(inner),
        })
}

/// Readings grow by a fixed step per sample
struct Step {
    value: u64,
    step: u64,
}

impl Sampler for Step {
    fn sample(&mut self) -> Result<u64, ProbeError> {
        self.value += self.step;
        Ok(self.value)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_real_usage_never_exceeds_usage(
        begin in any::<u64>(),
        end in any::<u64>(),
        inner in any::<u64>(),
    ) {
        let mut record = LoadRecord::new("u", begin);
        record.memory_end = end;
        record.memory_inner = inner;
        prop_assert!(record.real_usage() <= record.usage());
        prop_assert_eq!(record.usage(), end.saturating_sub(begin));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_merge_sums_usage_per_unit(
        records in prop::collection::vec(persisted_record(), 0..20),
    ) {
        let mut expected: HashMap<String, (u64, u64)> = HashMap::new();
        for r in &records {
            let entry = expected.entry(r.unit.clone()).or_default();
            entry.0 += r.usage;
            entry.1 += r.real_usage;
        }

        let merged = merge(records.clone());
        prop_assert_eq!(merged.len(), expected.len());
        for node in &merged {
            let (usage, real_usage) = expected[&node.unit];
            prop_assert_eq!(node.usage, usage);
            prop_assert_eq!(node.real_usage, real_usage);
        }

        for node in &merged {
            let first = records.iter().find(|r| r.unit == node.unit).unwrap();
            prop_assert_eq!(&node.parent, &first.parent);
        }
    }

    #[test]
    fn prop_merge_output_is_sorted_and_unique(
        records in prop::collection::vec(persisted_record(), 0..20),
    ) {
        let merged = merge(records);
        for pair in merged.windows(2) {
            prop_assert!(pair[0].unit < pair[1].unit);
        }
        for node in &merged {
            for pair in node.children.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }
    }

    #[test]
    fn prop_merged_children_respect_namespace_and_parent(
        records in prop::collection::vec(persisted_record(), 0..20),
    ) {
        let merged = merge(records);
        let parents: HashMap<&str, Option<&str>> = merged
            .iter()
            .map(|n| (n.unit.as_str(), n.parent.as_deref()))
            .collect();

        for node in &merged {
            for child in &node.children {
                prop_assert!(!namespace::overlaps(&node.unit, child));
                prop_assert_ne!(Some(child.as_str()), node.parent.as_deref());
                if let Some(Some(child_parent)) = parents.get(child.as_str()) {
                    prop_assert_ne!(*child_parent, node.unit.as_str());
                }
            }
        }
    }

    #[test]
    fn prop_merge_is_idempotent(
        records in prop::collection::vec(persisted_record(), 0..20),
    ) {
        let once = merge(records);
        let twice = merge(once.iter().cloned().map(PersistedRecord::from));
        prop_assert_eq!(once, twice);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_balanced_loads_unwind(
        depths in prop::collection::vec(1usize..5, 1..10),
        step in 1u64..4096,
    ) {
        let mut stack = AttributionStack::new(Box::new(Step { value: 0, step }));
        let mut finished = Vec::new();

        for (i, depth) in depths.iter().enumerate() {
            let names: Vec<String> = (0..*depth).map(|d| format!("u{}_{}", i, d)).collect();
            for name in &names {
                stack.enter(name).unwrap();
            }
            for name in names.iter().rev() {
                finished.push(stack.exit(name).unwrap());
            }
            prop_assert!(stack.is_idle());
        }

        prop_assert_eq!(finished.len(), depths.iter().sum::<usize>());
        for record in &finished {
            prop_assert!(record.real_usage() <= record.usage());
            prop_assert!(record.usage() >= step);
            if let Some(parent) = &record.parent {
                prop_assert!(record.unit.rsplit_once('_').map(|(p, _)| p)
                    == parent.rsplit_once('_').map(|(p, _)| p));
            }
        }
    }

    #[test]
    fn prop_mismatched_exit_is_rejected(
        entered in "[a-z]{1,8}",
        exited in "[a-z]{1,8}",
    ) {
        prop_assume!(entered != exited);
        let mut stack = AttributionStack::new(Box::new(Step { value: 0, step: 1 }));
        stack.enter(&entered).unwrap();
        prop_assert!(stack.exit(&exited).is_err());
        prop_assert_eq!(stack.depth(), 1);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_filter_never_panics(pattern in ".{0,16}", unit in ".{0,24}") {
        if let Ok(filter) = UnitFilter::from_patterns([pattern.as_str()]) {
            let _ = filter.allowed(&unit);
        }
    }

    #[test]
    fn prop_star_ignores_everything(unit in "[a-z_.]{0,24}") {
        let filter = UnitFilter::from_patterns(["*"]).unwrap();
        prop_assert!(!filter.allowed(&unit));
    }

    #[test]
    fn prop_literal_pattern_matches_only_itself(
        pattern in "[a-z_]{1,8}(\\.[a-z_]{1,8}){0,2}",
        suffix in "[a-z]{1,4}",
    ) {
        let filter = UnitFilter::from_patterns([pattern.as_str()]).unwrap();
        prop_assert!(!filter.allowed(&pattern));
        let longer = format!("{}.{}", pattern, suffix);
        prop_assert!(filter.allowed(&longer));
    }
}
