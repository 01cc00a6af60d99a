//! Wildcard permission matcher
//!
//! Compiles glob-like permission patterns into anchored regexes and tests
//! concrete permission names against them. Patterns are sequences of
//! segments separated by a delimiter (`:` by default); `*` as an entire
//! segment matches exactly one arbitrary segment at that position.
//!
//! One deliberate asymmetry: a *trailing* `*` matches the remainder of the
//! name, including multiple segments. `article:*` therefore matches both
//! `article:view` and `article:view:all`, while the interior wildcard in
//! `article:*:all` matches exactly one middle segment.
//!
//! Literal segments are escaped before compilation, so a permission name
//! containing regex metacharacters can never be interpreted as an
//! unintended pattern. A `*` embedded inside a segment (`art*cle`) is a
//! literal as well; only a standalone `*` segment is a wildcard.

use dashmap::DashMap;
use regex::Regex;
use tracing::warn;

/// Default segment delimiter
const DEFAULT_DELIMITER: char = ':';

/// Pattern matcher with a process-lifetime cache of compiled patterns.
///
/// Thread-safe; share across tasks with `Arc` or embed one per engine.
pub struct WildcardMatcher {
    delimiter: char,
    compiled: DashMap<String, Regex>,
}

impl WildcardMatcher {
    /// Create a matcher using the default `:` delimiter.
    pub fn new() -> Self {
        Self::with_delimiter(DEFAULT_DELIMITER)
    }

    /// Create a matcher with a custom segment delimiter (e.g. `.`).
    pub fn with_delimiter(delimiter: char) -> Self {
        Self {
            delimiter,
            compiled: DashMap::new(),
        }
    }

    /// Whether `pattern` contains a wildcard segment.
    ///
    /// Only a standalone `*` segment counts; `*` embedded in a literal
    /// segment does not make the pattern a wildcard.
    pub fn is_wildcard(&self, pattern: &str) -> bool {
        pattern.split(self.delimiter).any(|segment| segment == "*")
    }

    /// Test a concrete permission name against a pattern.
    ///
    /// A pattern without wildcard segments matches iff it equals the name
    /// verbatim.
    pub fn matches(&self, pattern: &str, name: &str) -> bool {
        if !self.is_wildcard(pattern) {
            return pattern == name;
        }

        if let Some(regex) = self.compiled.get(pattern) {
            return regex.is_match(name);
        }

        match Regex::new(&self.compile(pattern)) {
            Ok(regex) => {
                let matched = regex.is_match(name);
                self.compiled.insert(pattern.to_string(), regex);
                matched
            }
            Err(e) => {
                // Cannot happen for escaped input; fall back to verbatim.
                warn!("pattern '{}' failed to compile: {}", pattern, e);
                pattern == name
            }
        }
    }

    /// Expand a pattern against a list of known names, preserving the
    /// input order.
    ///
    /// Without a wildcard the result is a single element iff the pattern
    /// itself is present in `all_names`, otherwise empty.
    pub fn expand<'a>(&self, pattern: &str, all_names: &'a [String]) -> Vec<&'a str> {
        all_names
            .iter()
            .filter(|name| self.matches(pattern, name))
            .map(|name| name.as_str())
            .collect()
    }

    /// Drop all compiled patterns.
    ///
    /// Supports test isolation and administrative pattern changes.
    pub fn clear_cache(&self) {
        self.compiled.clear();
    }

    /// Number of patterns currently compiled.
    pub fn cached_patterns(&self) -> usize {
        self.compiled.len()
    }

    /// Translate a pattern into an anchored regex source string.
    fn compile(&self, pattern: &str) -> String {
        let segments: Vec<&str> = pattern.split(self.delimiter).collect();
        let last = segments.len() - 1;
        let delimiter = regex::escape(&self.delimiter.to_string());

        let mut source = String::from("^");
        for (idx, segment) in segments.iter().enumerate() {
            if idx > 0 {
                source.push_str(&delimiter);
            }
            if *segment == "*" {
                if idx == last {
                    // Trailing wildcard spans the remainder of the name.
                    source.push_str(".+");
                } else {
                    source.push_str(&format!("[^{}]+", delimiter));
                }
            } else {
                source.push_str(&regex::escape(segment));
            }
        }
        source.push('$');
        source
    }
}

impl Default for WildcardMatcher {
    fn default() -> Self {
        Self::new()
    }
}
