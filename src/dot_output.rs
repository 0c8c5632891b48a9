//! Graphviz rendering of the attribution graph
//!
//! One node per unit labelled with its total and self usage. A solid edge
//! runs from each parent to the unit it loaded; a dashed edge runs from a
//! unit to each dependency it reused.

use crate::memory::mb;
use crate::merge::GraphRecord;
use std::fmt::Write as _;

/// Render merged records as a DOT digraph
pub fn render_dot(records: &[GraphRecord]) -> String {
    let mut out = String::new();
    out.push_str("// Unit memory graph\n");
    out.push_str("digraph {\n");
    out.push_str("\tgraph [rankdir=LR]\n");

    for record in records {
        let _ = writeln!(
            out,
            "\t{} [label={}]",
            quote(&record.unit),
            quote(&format!(
                "{}\n{}M / +{}M",
                record.unit,
                mb(record.usage),
                mb(record.real_usage)
            ))
        );
    }

    for record in records {
        if let Some(parent) = &record.parent {
            let _ = writeln!(out, "\t{} -> {}", quote(parent), quote(&record.unit));
        }
        for child in &record.children {
            let _ = writeln!(
                out,
                "\t{} -> {} [style=dashed]",
                quote(&record.unit),
                quote(child)
            );
        }
    }

    out.push_str("}\n");
    out
}

/// Quote a DOT identifier
fn quote(id: &str) -> String {
    let mut quoted = String::with_capacity(id.len() + 2);
    quoted.push('"');
    for c in id.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    fn node(unit: &str, parent: Option<&str>, children: &[&str]) -> GraphRecord {
        GraphRecord {
            unit: unit.to_string(),
            parent: parent.map(str::to_string),
            children: children.iter().map(|c| c.to_string()).collect(),
            usage: 12 * MB,
            real_usage: 5 * MB,
        }
    }

    #[test]
    fn test_empty_graph() {
        let dot = render_dot(&[]);
        assert!(dot.contains("digraph {"));
        assert!(dot.contains("rankdir=LR"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_nodes_and_edges() {
        let dot = render_dot(&[
            node("pkg", None, &["json"]),
            node("pkg.sub", Some("pkg"), &[]),
            node("json", None, &[]),
        ]);
        assert!(dot.contains("\t\"pkg\" [label=\"pkg\\n12M / +5M\"]\n"));
        assert!(dot.contains("\t\"pkg\" -> \"pkg.sub\"\n"));
        assert!(dot.contains("\t\"pkg\" -> \"json\" [style=dashed]\n"));
        assert_eq!(dot.matches("->").count(), 2);
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
        assert_eq!(quote("a\\b"), "\"a\\\\b\"");
    }
}
