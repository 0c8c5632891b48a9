//! Filesystem-backed units
//!
//! A unit `a.b.c` lives either at `<root>/a/b/c/mod.unit` (a package, which
//! may contain further units) or at `<root>/a/b/c.unit` (a leaf). Unit files
//! are line-oriented; each line may carry one directive:
//!
//! ```text
//! # comment
//! load other.unit      # load a dependency through the host
//! reserve 16M          # keep a buffer of that size alive (plain bytes, K or M)
//! fail reason text     # fail materialization
//! ```
//!
//! Any other line is payload and only contributes its bytes.

use crate::error::LoadError;
use crate::host::{Finder, Host, Loader, Located, Unit};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const UNIT_EXTENSION: &str = "unit";
pub const PACKAGE_FILE: &str = "mod.unit";

/// Finds units below a root directory
pub struct TreeFinder {
    root: PathBuf,
    loader: Rc<dyn Loader>,
}

impl TreeFinder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            loader: Rc::new(TreeLoader),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `name`, if any
    pub fn path_for(&self, name: &str) -> Option<PathBuf> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.iter().any(|p| p.is_empty() || p.contains(['/', '\\'])) {
            return None;
        }

        let dir: PathBuf = parts.iter().fold(self.root.clone(), |acc, p| acc.join(p));
        let package = dir.join(PACKAGE_FILE);
        if package.is_file() {
            return Some(package);
        }

        let leaf = dir.with_extension(UNIT_EXTENSION);
        leaf.is_file().then_some(leaf)
    }
}

impl Finder for TreeFinder {
    fn locate(&self, name: &str) -> Option<Located> {
        self.path_for(name).map(|path| Located {
            loader: self.loader.clone(),
            origin: Some(path),
        })
    }
}

/// One parsed line of a unit file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive<'a> {
    Load(&'a str),
    Reserve(usize),
    Fail(&'a str),
    Payload,
}

/// Parse one line of a unit file
pub fn parse_directive(line: &str) -> Result<Directive<'_>, String> {
    let line = match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
    .trim();

    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((k, r)) => (k, r.trim()),
        None => (line, ""),
    };

    match keyword {
        "load" if !rest.is_empty() => Ok(Directive::Load(rest)),
        "load" => Err("load needs a unit name".to_string()),
        "reserve" => parse_size(rest).map(Directive::Reserve),
        "fail" => Ok(Directive::Fail(rest)),
        _ => Ok(Directive::Payload),
    }
}

fn parse_size(text: &str) -> Result<usize, String> {
    let (digits, multiplier) = match text.chars().last() {
        Some('K' | 'k') => (&text[..text.len() - 1], 1024),
        Some('M' | 'm') => (&text[..text.len() - 1], 1024 * 1024),
        _ => (text, 1),
    };
    digits
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| format!("invalid size '{}'", text))
}

/// Materializes unit files
#[derive(Debug, Default)]
pub struct TreeLoader;

impl Loader for TreeLoader {
    fn materialize(&self, unit: &Unit, host: &Host) -> Result<(), LoadError> {
        let name = unit.name();
        let path = unit
            .origin()
            .ok_or_else(|| LoadError::failed(name, "unit has no origin file"))?;
        let text = fs::read_to_string(path)
            .map_err(|e| LoadError::failed(name, format!("{}: {}", path.display(), e)))?;

        for (lineno, line) in text.lines().enumerate() {
            let directive = parse_directive(line)
                .map_err(|e| LoadError::failed(name, format!("line {}: {}", lineno + 1, e)))?;
            match directive {
                Directive::Load(dep) => match host.load(dep) {
                    Ok(_) => {}
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        return Err(LoadError::failed(
                            name,
                            format!("dependency {}: {}", dep, err),
                        ))
                    }
                },
                Directive::Reserve(bytes) => unit.retain(filled_buffer(bytes).map_err(|e| {
                    LoadError::failed(name, format!("line {}: reserve {}: {}", lineno + 1, bytes, e))
                })?),
                Directive::Fail(reason) => return Err(LoadError::failed(name, reason)),
                Directive::Payload => {}
            }
        }

        unit.retain(text.into_bytes());
        Ok(())
    }
}

/// A buffer of `bytes` bytes, failing instead of aborting when it cannot be allocated
fn filled_buffer(bytes: usize) -> Result<Vec<u8>, std::collections::TryReserveError> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(bytes)?;
    buffer.resize(bytes, 0xA5);
    Ok(buffer)
}

/// Top-level units directly under `root`, sorted
pub fn top_level_units(root: &Path) -> Result<Vec<String>> {
    let mut units = Vec::new();
    let entries = fs::read_dir(root)
        .with_context(|| format!("Failed to read unit root: {}", root.display()))?;
    for entry in entries {
        let path = entry?.path();
        if let Some(name) = unit_name_of(&path) {
            units.push(name);
        }
    }
    units.sort();
    units.dedup();
    Ok(units)
}

/// `top` and every unit below it, sorted so ancestors come first
pub fn discover(root: &Path, top: &str) -> Result<Vec<String>> {
    let finder = TreeFinder::new(root);
    let mut units = Vec::new();
    let Some(path) = finder.path_for(top) else {
        return Ok(units);
    };
    units.push(top.to_string());

    if path.file_name().and_then(|f| f.to_str()) == Some(PACKAGE_FILE) {
        if let Some(dir) = path.parent() {
            walk(dir, top, &mut units)?;
        }
    }
    units.sort();
    Ok(units)
}

fn walk(dir: &Path, prefix: &str, units: &mut Vec<String>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let Some(name) = unit_name_of(&path) else {
            continue;
        };
        let full = format!("{}.{}", prefix, name);
        if path.is_dir() {
            walk(&path, &full, units)?;
        }
        units.push(full);
    }
    Ok(())
}

/// Unit name for a directory holding `mod.unit` or a `*.unit` leaf file
fn unit_name_of(path: &Path) -> Option<String> {
    if path.is_dir() {
        if !path.join(PACKAGE_FILE).is_file() {
            return None;
        }
        return path.file_name()?.to_str().map(str::to_string);
    }
    if path.file_name()?.to_str()? == PACKAGE_FILE {
        return None;
    }
    if path.extension()?.to_str()? != UNIT_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    (!stem.contains('.')).then(|| stem.to_string())
}
