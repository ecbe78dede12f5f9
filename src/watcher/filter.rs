//! Ignore-pattern predicate.
//!
//! Patterns are matched as globs against both the full path and the file
//! name, so `*.log` and `*/target/*` both do what one expects. A pattern
//! that is not a valid glob falls back to plain substring matching.

use std::path::Path;

use glob::Pattern;

#[derive(Debug, Clone)]
enum Matcher {
    Glob(Pattern),
    Substring(String),
}

impl Matcher {
    fn compile(raw: &str) -> Self {
        match Pattern::new(raw) {
            Ok(pattern) => Matcher::Glob(pattern),
            Err(e) => {
                crate::debug_event!("filter", "literal pattern", "{raw}: {e}");
                Matcher::Substring(raw.to_string())
            }
        }
    }

    fn matches(&self, path: &Path) -> bool {
        match self {
            Matcher::Glob(pattern) => {
                pattern.matches_path(path)
                    || path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| pattern.matches(name))
            }
            Matcher::Substring(needle) => path.to_string_lossy().contains(needle.as_str()),
        }
    }
}

/// Ordered set of compiled ignore patterns.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    patterns: Vec<String>,
    matchers: Vec<Matcher>,
}

impl PathFilter {
    /// Compile the given patterns, keeping their order.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        let matchers = patterns.iter().map(|p| Matcher::compile(p)).collect();
        Self { patterns, matchers }
    }

    /// True if any pattern matches. The first match short-circuits.
    pub fn should_ignore(&self, path: &Path) -> bool {
        self.matchers.iter().any(|m| m.matches(path))
    }

    /// The raw patterns, in order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

/// One-shot form of [`PathFilter::should_ignore`].
pub fn should_ignore(path: &Path, patterns: &[String]) -> bool {
    PathFilter::new(patterns).should_ignore(path)
}
