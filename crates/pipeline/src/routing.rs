//! Declarative route patterns.
//!
//! A pattern is a path with three kinds of tokens:
//!
//! | Token | Matches | Captured |
//! |-------|---------|----------|
//! | `/:name` | `/` followed by a run of non-slash characters | yes |
//! | `/:name?` | the above, or nothing at all | yes, when present |
//! | `*` | anything, including `/` | no |
//!
//! Every other character is literal. Patterns are anchored to the whole path,
//! so `/users/:id` matches `/users/42` but not `/users/42/posts`.
//!
//! A compiled [`RoutePattern`] holds no per-request state and is shared freely
//! across concurrent requests.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;

/// How a set of [`RouteParams`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamSource {
    /// The path matched the pattern; values come from its captures.
    Pattern,
    /// The path did not match; values were assigned by segment index.
    ///
    /// This is a best-effort fallback. It can produce wrong values for paths
    /// whose shape differs from the pattern and must never be taken as
    /// evidence that the path is valid.
    Positional,
}

/// Parameter values extracted from a request path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteParams {
    pub values: BTreeMap<String, String>,
    pub source: ParamSource,
}

impl RouteParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> BTreeMap<String, String> {
        self.values
    }
}

/// A route pattern compiled to an anchored regular expression.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    pattern: String,
    regex: Regex,
    names: Vec<String>,
}

impl RoutePattern {
    /// Compiles `pattern`. Returns `None` for an empty pattern, which matches
    /// nothing.
    pub fn compile(pattern: &str) -> Option<Self> {
        if pattern.is_empty() {
            return None;
        }

        let mut expr = String::with_capacity(pattern.len() * 2 + 2);
        let mut names = Vec::new();
        expr.push('^');

        let mut rest = pattern;
        while let Some(c) = rest.chars().next() {
            if let Some(tail) = rest.strip_prefix("/:") {
                let name_len = tail
                    .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                    .unwrap_or(tail.len());
                if name_len > 0 {
                    names.push(tail[..name_len].to_owned());
                    let after = &tail[name_len..];
                    if let Some(after_optional) = after.strip_prefix('?') {
                        expr.push_str("(?:/([^/]+)?)?");
                        rest = after_optional;
                    } else {
                        expr.push_str("/([^/]+)");
                        rest = after;
                    }
                    continue;
                }
            }

            if c == '*' {
                expr.push_str(".*");
            } else {
                let mut buf = [0u8; 4];
                expr.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            }
            rest = &rest[c.len_utf8()..];
        }
        expr.push('$');

        // Every literal is escaped, so the expression is always valid.
        let regex = Regex::new(&expr).ok()?;
        Some(Self {
            pattern: pattern.to_owned(),
            regex,
            names,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Parameter names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Returns `true` if `path` satisfies the pattern.
    pub fn matches(&self, path: &str) -> bool {
        !path.is_empty() && self.regex.is_match(path)
    }

    /// Extracts parameter values from `path`.
    ///
    /// On a match, captures are zipped to names in order and optional
    /// parameters that are absent are omitted. Otherwise falls back to
    /// [`ParamSource::Positional`] extraction.
    pub fn extract(&self, path: &str) -> RouteParams {
        if let Some(captures) = self.regex.captures(path) {
            let values = self
                .names
                .iter()
                .enumerate()
                .filter_map(|(i, name)| {
                    captures
                        .get(i + 1)
                        .map(|m| (name.clone(), m.as_str().to_owned()))
                })
                .collect();
            return RouteParams {
                values,
                source: ParamSource::Pattern,
            };
        }
        positional(&self.pattern, path)
    }
}

/// Returns `true` if `path` satisfies `pattern`. Empty inputs never match.
pub fn validate(pattern: &str, path: &str) -> bool {
    RoutePattern::compile(pattern).is_some_and(|p| p.matches(path))
}

/// Extracts the parameters `pattern` declares from `path`.
pub fn extract_params(pattern: &str, path: &str) -> RouteParams {
    match RoutePattern::compile(pattern) {
        Some(compiled) => compiled.extract(path),
        None => RouteParams {
            values: BTreeMap::new(),
            source: ParamSource::Pattern,
        },
    }
}

// Index-aligned split: pattern segment i that starts with ':' takes path
// segment i. Segments missing from the path are left out.
fn positional(pattern: &str, path: &str) -> RouteParams {
    let actual: Vec<&str> = path.split('/').collect();
    let values = pattern
        .split('/')
        .enumerate()
        .filter_map(|(i, segment)| {
            let name = segment.strip_prefix(':')?;
            let name = name.strip_suffix('?').unwrap_or(name);
            actual.get(i).map(|v| (name.to_owned(), (*v).to_owned()))
        })
        .collect();

    tracing::debug!(pattern, path, "route did not match; parameters assigned by position");

    RouteParams {
        values,
        source: ParamSource::Positional,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_segment_is_extracted() {
        let params = extract_params("/users/:id", "/users/42");
        assert_eq!(params.get("id"), Some("42"));
        assert_eq!(params.source, ParamSource::Pattern);
        assert!(validate("/users/:id", "/users/42"));
    }

    #[test]
    fn named_segment_does_not_span_slashes() {
        assert!(!validate("/users/:id", "/users/42/posts"));
        assert!(!validate("/users/:id", "/users/"));
    }

    #[test]
    fn optional_segment_may_be_absent() {
        assert!(validate("/a/:x?/b", "/a/b"));
        assert!(validate("/a/:x?/b", "/a/1/b"));
        assert!(!validate("/a/:x?/b", "/a/1/2/b"));

        assert_eq!(extract_params("/a/:x?/b", "/a/1/b").get("x"), Some("1"));
        let absent = extract_params("/a/:x?/b", "/a/b");
        assert_eq!(absent.source, ParamSource::Pattern);
        assert!(absent.is_empty());
    }

    #[test]
    fn wildcard_matches_any_path() {
        assert!(validate("*", "/"));
        assert!(validate("*", "/anything/at/all"));
        assert!(validate("/files/*", "/files/a/b.txt"));
        assert!(!validate("/files/*", "/other"));
    }

    #[test]
    fn literals_are_not_regex_syntax() {
        assert!(validate("/v1.0/items", "/v1.0/items"));
        assert!(!validate("/v1.0/items", "/v1x0/items"));
    }

    #[test]
    fn empty_inputs_never_validate() {
        assert!(!validate("", "/"));
        assert!(!validate("/", ""));
    }

    #[test]
    fn multiple_parameters_keep_declaration_order() {
        let pattern = RoutePattern::compile("/:org/repos/:repo").unwrap();
        assert_eq!(pattern.names(), ["org", "repo"]);
        let params = pattern.extract("/acme/repos/widgets");
        assert_eq!(params.get("org"), Some("acme"));
        assert_eq!(params.get("repo"), Some("widgets"));
    }

    #[test]
    fn mismatch_falls_back_to_positional_assignment() {
        // Too many segments for the pattern: no match, values by index.
        let params = extract_params("/users/:id", "/users/42/extra");
        assert_eq!(params.source, ParamSource::Positional);
        assert_eq!(params.get("id"), Some("42"));

        // The fallback is lossy: a wrong literal segment still yields a value.
        let params = extract_params("/users/:id", "/groups/7");
        assert_eq!(params.source, ParamSource::Positional);
        assert_eq!(params.get("id"), Some("7"));
        assert!(!validate("/users/:id", "/groups/7"));
    }

    #[test]
    fn positional_fallback_omits_missing_values() {
        let params = extract_params("/a/b/:c/:d?", "/x");
        assert_eq!(params.source, ParamSource::Positional);
        assert!(params.get("c").is_none());
        assert!(params.get("d").is_none());
    }

    #[test]
    fn compiled_patterns_are_reusable() {
        let pattern = RoutePattern::compile("/items/:id").unwrap();
        for id in ["1", "2", "abc"] {
            let path = format!("/items/{id}");
            assert!(pattern.matches(&path));
            assert_eq!(pattern.extract(&path).get("id"), Some(id));
        }
    }
}
