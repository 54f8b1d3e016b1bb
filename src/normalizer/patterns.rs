//! Allow/deny URL pattern matching: glob by default, `/.../`-wrapped regex
//! as an escape hatch, mirroring the two forms `spec.md` calls out.

use globset::{Glob, GlobMatcher};
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternSetError {
    #[error("invalid glob pattern {pattern:?}: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("invalid regex pattern {pattern:?}: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

enum Matcher {
    Glob(GlobMatcher),
    Regex(Regex),
}

impl Matcher {
    fn is_match(&self, candidate: &str) -> bool {
        match self {
            Self::Glob(g) => g.is_match(candidate),
            Self::Regex(r) => r.is_match(candidate),
        }
    }
}

/// A compiled set of allow/deny patterns, each either a glob or a
/// `/pattern/`-wrapped regex.
pub struct PatternSet {
    patterns: Vec<(String, Matcher)>,
}

impl std::fmt::Debug for PatternSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternSet")
            .field("len", &self.patterns.len())
            .finish()
    }
}

impl Clone for PatternSet {
    fn clone(&self) -> Self {
        // Matchers are cheap to recompile; patterns were already validated once.
        Self::compile(&self.patterns.iter().map(|(p, _)| p.clone()).collect::<Vec<_>>())
            .expect("previously-validated patterns must recompile")
    }
}

impl PatternSet {
    #[must_use]
    pub fn empty() -> Self {
        Self { patterns: Vec::new() }
    }

    pub fn compile(patterns: &[String]) -> Result<Self, PatternSetError> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let matcher = if pattern.len() >= 2 && pattern.starts_with('/') && pattern.ends_with('/') {
                let inner = &pattern[1..pattern.len() - 1];
                let regex = Regex::new(inner).map_err(|source| PatternSetError::Regex {
                    pattern: pattern.clone(),
                    source,
                })?;
                Matcher::Regex(regex)
            } else {
                let glob = Glob::new(pattern)
                    .map_err(|source| PatternSetError::Glob {
                        pattern: pattern.clone(),
                        source,
                    })?
                    .compile_matcher();
                Matcher::Glob(glob)
            };
            compiled.push((pattern.clone(), matcher));
        }
        Ok(Self { patterns: compiled })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns the text of the first pattern that matches `candidate`, if any.
    #[must_use]
    pub fn first_match(&self, candidate: &str) -> Option<String> {
        self.patterns
            .iter()
            .find(|(_, matcher)| matcher.is_match(candidate))
            .map(|(pattern, _)| pattern.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches() {
        let set = PatternSet::compile(&["*/admin/*".to_string()]).unwrap();
        assert!(set.first_match("https://example.com/admin/x").is_some());
        assert!(set.first_match("https://example.com/blog/x").is_none());
    }

    #[test]
    fn regex_form_is_unwrapped() {
        let set = PatternSet::compile(&["/\\.pdf$/".to_string()]).unwrap();
        assert!(set.first_match("https://example.com/a.pdf").is_some());
        assert!(set.first_match("https://example.com/a.html").is_none());
    }

    #[test]
    fn empty_set_matches_nothing() {
        let set = PatternSet::empty();
        assert!(set.is_empty());
        assert!(set.first_match("anything").is_none());
    }
}
