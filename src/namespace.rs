//! Dotted unit names

/// Namespace parent of `name` (`"a.b.c"` -> `"a.b"`), `None` for top-level units
pub fn parent_of(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(parent, _)| parent)
}

/// Whether `ancestor` is a strict namespace ancestor of `name`
pub fn is_ancestor(ancestor: &str, name: &str) -> bool {
    name.len() > ancestor.len()
        && name.starts_with(ancestor)
        && name.as_bytes()[ancestor.len()] == b'.'
}

/// Whether two names are equal or one contains the other in its namespace
pub fn overlaps(a: &str, b: &str) -> bool {
    a == b || is_ancestor(a, b) || is_ancestor(b, a)
}
