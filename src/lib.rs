//! loadmeter - per-unit memory attribution for hierarchical unit loading
//!
//! This library instruments a loading subsystem so every unit load is
//! bracketed by memory readings, splitting each unit's usage into what it
//! allocated itself and what the units it loaded consumed. Finished records
//! can be saved as JSON and merged offline into a deduplicated attribution
//! graph.

pub mod cli;
pub mod config;
pub mod csv_output;
pub mod dot_output;
pub mod error;
pub mod filter;
pub mod host;
pub mod interceptor;
pub mod json_output;
pub mod memory;
pub mod merge;
pub mod namespace;
pub mod record;
pub mod registry;
pub mod reporter;
pub mod session;
pub mod source_tree;
pub mod stack;
