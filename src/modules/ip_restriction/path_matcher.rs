//! Protected-path classification.
//!
//! A path is tested in three forms: as given, with a leading `/` ensured,
//! and with one leading `/` removed. Rules are therefore authored with or
//! without the slash and still match. Each pattern is anchored at the start
//! of the form it is tested against; in [`PathMatchMode::Prefix`] anything
//! may follow the match, in [`PathMatchMode::Full`] nothing may.

use super::config::PathMatchMode;
use super::error::{RestrictionError, RestrictionResult};
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Compiled set of protected-path patterns.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    /// Source patterns that compiled, as configured.
    patterns: HashSet<String>,

    /// Anchored regexes, one per entry in `patterns`.
    compiled: Vec<CompiledPattern>,

    /// Match mode used when compiling.
    mode: PathMatchMode,
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    source: String,
    regex: Regex,
}

impl PathMatcher {
    /// Compile a pattern set, skipping (and logging) patterns that fail to compile.
    #[must_use]
    pub fn new<'a, I>(patterns: I, mode: PathMatchMode) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut kept = HashSet::new();
        let mut compiled = Vec::new();

        for pattern in patterns {
            if kept.contains(pattern) {
                continue;
            }
            match Self::compile(pattern, mode) {
                Ok(regex) => {
                    kept.insert(pattern.clone());
                    compiled.push(CompiledPattern {
                        source: pattern.clone(),
                        regex,
                    });
                },
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "excluding protected path pattern");
                },
            }
        }

        Self {
            patterns: kept,
            compiled,
            mode,
        }
    }

    /// Compile a pattern set, failing on the first pattern that does not compile.
    pub fn strict<'a, I>(patterns: I, mode: PathMatchMode) -> RestrictionResult<Self>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let patterns: Vec<&String> = patterns.into_iter().collect();
        for pattern in &patterns {
            Self::compile(pattern, mode)?;
        }
        Ok(Self::new(patterns, mode))
    }

    /// A matcher that protects nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            patterns: HashSet::new(),
            compiled: Vec::new(),
            mode: PathMatchMode::default(),
        }
    }

    fn compile(pattern: &str, mode: PathMatchMode) -> RestrictionResult<Regex> {
        // bare compile first; errors then quote the configured text
        Regex::new(pattern).map_err(|source| RestrictionError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let anchored = match mode {
            PathMatchMode::Prefix => format!("^(?:{pattern})"),
            PathMatchMode::Full => format!("^(?:{pattern})$"),
        };
        Regex::new(&anchored).map_err(|source| RestrictionError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
    }

    /// Check whether a request path is protected.
    #[must_use]
    pub fn is_protected(&self, path: &str) -> bool {
        if self.compiled.is_empty() {
            return false;
        }

        let with_slash: Cow<'_, str> = if path.starts_with('/') {
            Cow::Borrowed(path)
        } else {
            Cow::Owned(format!("/{path}"))
        };
        let without_slash = path.strip_prefix('/').unwrap_or(path);
        let forms = [with_slash.as_ref(), without_slash, path];

        for pattern in &self.compiled {
            if forms.iter().any(|form| pattern.regex.is_match(form)) {
                debug!(path = %path, pattern = %pattern.source, "path is protected");
                return true;
            }
        }

        false
    }

    /// Source patterns that are in effect.
    #[must_use]
    pub fn patterns(&self) -> &HashSet<String> {
        &self.patterns
    }

    /// Number of patterns in effect.
    #[must_use]
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    /// Returns `true` if no pattern is in effect.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    /// Match mode this matcher was compiled with.
    #[must_use]
    pub fn mode(&self) -> PathMatchMode {
        self.mode
    }
}

impl Default for PathMatcher {
    fn default() -> Self {
        Self::empty()
    }
}

/// Check a path against a pattern set in prefix mode.
///
/// Compiles the patterns on every call; hot paths should hold a [`PathMatcher`].
#[must_use]
pub fn is_protected(path: &str, patterns: &HashSet<String>) -> bool {
    PathMatcher::new(patterns, PathMatchMode::Prefix).is_protected(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(patterns: &[&str]) -> HashSet<String> {
        patterns.iter().map(|p| (*p).to_string()).collect()
    }

    #[test]
    fn test_empty_set_protects_nothing() {
        let empty = HashSet::new();
        for path in ["/", "", "/admin", "admin", "/anything/at/all"] {
            assert!(!is_protected(path, &empty));
        }
        assert!(!PathMatcher::empty().is_protected("/admin"));
    }

    #[test]
    fn test_prefix_match() {
        let patterns = set(&["^/admin"]);
        assert!(is_protected("/admin", &patterns));
        assert!(is_protected("/admin/users", &patterns));
        assert!(is_protected("/admin/extra/segments", &patterns));
        assert!(!is_protected("/public/home", &patterns));
        // prefix leniency: this is the documented ambiguity
        assert!(is_protected("/administrator", &patterns));
    }

    #[test]
    fn test_slash_normalization() {
        // Rule written without a leading slash
        let patterns = set(&["admin/"]);
        assert!(is_protected("/admin/users", &patterns));
        assert!(is_protected("admin/users", &patterns));

        // Rule written with a leading slash, path without
        let patterns = set(&["/console/protected/"]);
        assert!(is_protected("console/protected/", &patterns));
        assert!(is_protected("/console/protected/", &patterns));
        assert!(!is_protected("/console/public/", &patterns));
    }

    #[test]
    fn test_match_is_anchored_at_start() {
        let patterns = set(&["admin"]);
        assert!(!is_protected("/site/admin", &patterns));
        assert!(is_protected("/admin", &patterns));
    }

    #[test]
    fn test_alternation_stays_anchored() {
        let patterns = set(&["/admin|/ops"]);
        assert!(is_protected("/ops/status", &patterns));
        assert!(!is_protected("/public/ops", &patterns));
    }

    #[test]
    fn test_full_mode() {
        let patterns = set(&["/admin/"]);
        let matcher = PathMatcher::new(&patterns, PathMatchMode::Full);
        assert!(matcher.is_protected("/admin/"));
        assert!(matcher.is_protected("admin/"));
        assert!(!matcher.is_protected("/admin/users"));
        assert!(!matcher.is_protected("/administrator/"));

        let patterns = set(&["/admin/.*"]);
        let matcher = PathMatcher::new(&patterns, PathMatchMode::Full);
        assert!(matcher.is_protected("/admin/users"));
        assert_eq!(matcher.mode(), PathMatchMode::Full);
    }

    #[test]
    fn test_malformed_pattern_excluded() {
        let patterns = set(&["(unclosed", "^/admin"]);
        let matcher = PathMatcher::new(&patterns, PathMatchMode::Prefix);
        assert_eq!(matcher.len(), 1);
        assert!(matcher.patterns().contains("^/admin"));
        assert!(matcher.is_protected("/admin"));
        assert!(!matcher.is_protected("(unclosed"));

        // Only malformed patterns: nothing is protected
        let matcher = PathMatcher::new(&set(&["[z-a]"]), PathMatchMode::Prefix);
        assert!(matcher.is_empty());
        assert!(!matcher.is_protected("/admin"));
    }

    #[test]
    fn test_strict_reports_bad_pattern() {
        let err = PathMatcher::strict(&set(&["(unclosed"]), PathMatchMode::Prefix).unwrap_err();
        assert!(matches!(
            err,
            RestrictionError::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"
        ));

        let matcher = PathMatcher::strict(&set(&["^/admin"]), PathMatchMode::Prefix).unwrap();
        assert_eq!(matcher.len(), 1);
    }

    #[test]
    fn test_duplicate_patterns_compiled_once() {
        let patterns = vec!["^/admin".to_string(), "^/admin".to_string()];
        let matcher = PathMatcher::new(&patterns, PathMatchMode::Prefix);
        assert_eq!(matcher.len(), 1);
    }
}
