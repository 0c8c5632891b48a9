//! Unit ignore filtering with shell-style patterns
//!
//! Patterns follow `fnmatch` rules: `*` matches any run of characters
//! (including dots), `?` matches one character, `[seq]` and `[!seq]` match
//! character classes. An unterminated `[` is a literal. Matching is against
//! the whole unit name.

use crate::error::ConfigError;
use regex::Regex;

/// Patterns ignored unless the configuration opts out
pub const DEFAULT_IGNORE: &[&str] = &["*test*"];

/// Decides which units a scan may load
#[derive(Debug, Clone)]
pub struct UnitFilter {
    patterns: Vec<(String, Regex)>,
}

impl UnitFilter {
    /// A filter that allows every unit
    pub fn allow_all() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Compile a list of ignore patterns
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let pattern = p.as_ref().trim().to_string();
                let regex = Regex::new(&glob_to_regex(&pattern)).map_err(|source| {
                    ConfigError::Pattern {
                        pattern: pattern.clone(),
                        source,
                    }
                })?;
                Ok((pattern, regex))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self { patterns })
    }

    /// Whether `unit` is not matched by any ignore pattern
    pub fn allowed(&self, unit: &str) -> bool {
        !self.patterns.iter().any(|(_, regex)| regex.is_match(unit))
    }

    /// The source patterns, in order
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(p, _)| p.as_str())
    }
}

/// Translate a shell glob into an anchored regex
pub fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push('[');
                    let mut j = i + 1;
                    if chars[j] == '!' {
                        out.push('^');
                        j += 1;
                    }
                    push_class_body(&mut out, &chars[j..end]);
                    out.push(']');
                    i = end;
                }
                None => out.push_str(r"\["),
            },
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    out
}

/// Copy a class body, keeping `x-y` ranges and everything else literal
///
/// The regex crate reads `&&`, `--` and `~~` inside a class as set
/// operations, so punctuation is escaped unless it is a range dash.
fn push_class_body(out: &mut String, body: &[char]) {
    let mut k = 0;
    while k < body.len() {
        push_class_char(out, body[k]);
        if k + 2 < body.len() && body[k + 1] == '-' {
            out.push('-');
            push_class_char(out, body[k + 2]);
            k += 3;
        } else {
            k += 1;
        }
    }
}

fn push_class_char(out: &mut String, c: char) {
    // `\<` and `\>` are word boundaries, not escapes; both are literal in a class
    if c.is_ascii_punctuation() && c != '<' && c != '>' {
        out.push('\\');
    }
    out.push(c);
}

/// Index of the `]` closing the class opened at `start`
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    // A leading `]` is part of the class
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    (j..chars.len()).find(|&k| chars[k] == ']')
}
