//! Interpolation parsing
//!
//! Recognizes placeholders of the form:
//! - `${path.to.value}` - reference to another node, from the root
//! - `${.sibling}` / `${..uncle}` - reference relative to the holding node
//! - `${resolver:arg1,arg2}` - call to a registered resolver
//!
//! A string that is exactly one placeholder is an interpolation; a string
//! that mixes placeholders and literal text is a string interpolation.

use std::sync::LazyLock;

use regex::Regex;

use crate::value::{Value, MISSING};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{(\w+:)?([\w.%_ \\,-]*?)\}").expect("placeholder pattern is valid")
});

/// Classification of a raw value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// A plain value
    Value,
    /// The `???` marker
    MandatoryMissing,
    /// Exactly one placeholder: `${foo}` or `${env:HOME}`
    Interpolation,
    /// Placeholders mixed with text: `http://${host}:${port}`
    StrInterpolation,
}

/// Classify a raw value
pub fn value_kind(value: &Value) -> ValueKind {
    let Value::String(s) = value else {
        return ValueKind::Value;
    };
    if s == MISSING {
        return ValueKind::MandatoryMissing;
    }

    let mut matches = PLACEHOLDER.find_iter(s);
    match (matches.next(), matches.next()) {
        (None, _) => ValueKind::Value,
        (Some(m), None) if m.as_str() == s => ValueKind::Interpolation,
        _ => ValueKind::StrInterpolation,
    }
}

/// A parsed interpolation expression
#[derive(Debug, Clone, PartialEq)]
pub enum Interpolation {
    /// Literal text between placeholders
    Literal(String),
    /// A resolver call: `${name:args}`
    Resolver {
        name: String,
        /// Raw argument text, used as the cache key
        args: String,
    },
    /// A node reference: `${path.to.value}`
    SelfRef {
        /// Path with leading dots removed
        path: String,
        /// Number of leading dots (0 for absolute references)
        up: usize,
    },
    /// A string template with one or more placeholders
    Concat(Vec<Interpolation>),
}

/// Parse a string into its interpolation structure
pub fn parse(input: &str) -> Interpolation {
    let mut parts = Vec::new();
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            parts.push(Interpolation::Literal(input[last..whole.start()].to_string()));
        }
        let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let part = match caps.get(1) {
            Some(prefix) => Interpolation::Resolver {
                name: prefix.as_str().trim_end_matches(':').to_string(),
                args: body.to_string(),
            },
            None => {
                let path = body.trim();
                let rest = path.trim_start_matches('.');
                Interpolation::SelfRef {
                    up: path.len() - rest.len(),
                    path: rest.to_string(),
                }
            }
        };
        parts.push(part);
        last = whole.end();
    }
    if last < input.len() {
        parts.push(Interpolation::Literal(input[last..].to_string()));
    }

    match parts.len() {
        0 => Interpolation::Literal(String::new()),
        1 => parts.remove(0),
        _ => Interpolation::Concat(parts),
    }
}

/// Split raw resolver arguments into positional strings.
///
/// Arguments are separated by unescaped commas; unescaped spaces around an
/// argument lose one unescaped space on each side and `\,` / `\ ` are
/// unescaped.
pub fn tokenize_args(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ',' => pieces.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    pieces.push(current);

    pieces
        .iter()
        .map(|p| unescape(trim_unescaped(p)))
        .collect()
}

fn trim_unescaped(s: &str) -> &str {
    let s = s.strip_prefix(' ').unwrap_or(s);
    match s.strip_suffix(' ') {
        Some(rest) if !rest.ends_with('\\') => rest,
        _ => s,
    }
}

fn unescape(s: &str) -> String {
    s.replace("\\,", ",").replace("\\ ", " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_value_kind() {
        assert_eq!(value_kind(&Value::Integer(1)), ValueKind::Value);
        assert_eq!(value_kind(&Value::from("plain")), ValueKind::Value);
        assert_eq!(value_kind(&Value::from("???")), ValueKind::MandatoryMissing);
        assert_eq!(value_kind(&Value::from("${foo}")), ValueKind::Interpolation);
        assert_eq!(value_kind(&Value::from("${env:HOME}")), ValueKind::Interpolation);
        assert_eq!(value_kind(&Value::from("${a.b.c}")), ValueKind::Interpolation);
        assert_eq!(value_kind(&Value::from("foo_${bar}")), ValueKind::StrInterpolation);
        assert_eq!(value_kind(&Value::from("${a}${b}")), ValueKind::StrInterpolation);
        assert_eq!(value_kind(&Value::from("${not closed")), ValueKind::Value);
    }

    #[test]
    fn test_parse_self_ref() {
        assert_eq!(
            parse("${database.host}"),
            Interpolation::SelfRef {
                path: "database.host".into(),
                up: 0
            }
        );
        assert_eq!(
            parse("${..sibling}"),
            Interpolation::SelfRef {
                path: "sibling".into(),
                up: 2
            }
        );
    }

    #[test]
    fn test_parse_resolver() {
        assert_eq!(
            parse("${env:HOME,/tmp}"),
            Interpolation::Resolver {
                name: "env".into(),
                args: "HOME,/tmp".into()
            }
        );
    }

    #[test]
    fn test_parse_concat() {
        assert_eq!(
            parse("http://${host}:${port}/"),
            Interpolation::Concat(vec![
                Interpolation::Literal("http://".into()),
                Interpolation::SelfRef {
                    path: "host".into(),
                    up: 0
                },
                Interpolation::Literal(":".into()),
                Interpolation::SelfRef {
                    path: "port".into(),
                    up: 0
                },
                Interpolation::Literal("/".into()),
            ])
        );
    }

    #[test]
    fn test_parse_plain_string() {
        assert_eq!(parse("hello"), Interpolation::Literal("hello".into()));
    }

    #[test]
    fn test_tokenize_args() {
        assert_eq!(tokenize_args(""), Vec::<String>::new());
        assert_eq!(tokenize_args("a"), vec!["a"]);
        assert_eq!(tokenize_args("a,b"), vec!["a", "b"]);
        assert_eq!(tokenize_args(" a , b "), vec!["a", "b"]);
        assert_eq!(tokenize_args("a\\,b"), vec!["a,b"]);
        assert_eq!(tokenize_args("a, b\\ "), vec!["a", "b "]);
        assert_eq!(tokenize_args("\\ a"), vec![" a"]);
        assert_eq!(tokenize_args("a,,b"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_tokenize_args_trims_one_space() {
        assert_eq!(tokenize_args("  a  ,b"), vec![" a ", "b"]);
        assert_eq!(tokenize_args("a, "), vec!["a", ""]);
        assert_eq!(tokenize_args("x,  "), vec!["x", ""]);
        assert_eq!(tokenize_args("a b"), vec!["a b"]);
    }
}
