//! Extraction paths.
//!
//! A small subset of JSONPath, sufficient for pointing at a single scalar inside a payload:
//!
//! - `$` is the document root, and may be omitted (`value` is the same as `$.value`)
//! - `.key` selects an object member
//! - `['key']` or `["key"]` selects an object member whose name contains `.` or `[`
//! - `[n]` selects an array element, with negative indices counting from the end
use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

/// Errors from parsing an extraction path.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum PathError {
    /// The path was empty.
    #[error("path is empty")]
    Empty,

    /// A member selector had no name.
    #[error("empty member name in path '{0}'")]
    EmptyKey(String),

    /// A bracket or quote was opened but never closed.
    #[error("unterminated selector in path '{0}'")]
    Unterminated(String),

    /// A bracket selector held neither a quoted name nor an integer.
    #[error("invalid array index '{index}' in path '{path}'")]
    InvalidIndex {
        /// The full path.
        path: String,
        /// The offending selector.
        index: String,
    },

    /// A character appeared where a selector was expected.
    #[error("unexpected character in path '{0}'")]
    Unexpected(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    Key(String),
    Index(i64),
}

/// A compiled extraction path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValuePath {
    expr: String,
    segments: Vec<Segment>,
}

impl ValuePath {
    /// Compiles an extraction path.
    ///
    /// # Errors
    ///
    /// Returns a [`PathError`] describing the first malformed selector.
    pub fn parse(expr: &str) -> Result<ValuePath, PathError> {
        if expr.is_empty() {
            return Err(PathError::Empty);
        }

        let (mut rest, mut implicit_root) = match expr.strip_prefix('$') {
            Some(rest) => (rest, false),
            None => (expr, true),
        };

        let mut segments = Vec::new();
        while !rest.is_empty() {
            if let Some(tail) = rest.strip_prefix('[') {
                let (segment, tail) = parse_bracket(expr, tail)?;
                segments.push(segment);
                rest = tail;
            } else {
                let tail = match rest.strip_prefix('.') {
                    Some(tail) => tail,
                    None if implicit_root => rest,
                    None => return Err(PathError::Unexpected(expr.to_owned())),
                };

                let end = tail.find(|c| c == '.' || c == '[').unwrap_or(tail.len());
                let key = &tail[..end];
                if key.is_empty() {
                    return Err(PathError::EmptyKey(expr.to_owned()));
                }
                segments.push(Segment::Key(key.to_owned()));
                rest = &tail[end..];
            }
            implicit_root = false;
        }

        Ok(ValuePath { expr: expr.to_owned(), segments })
    }

    /// Evaluates the path against `document`.
    ///
    /// Returns `None` if any selector does not apply (missing member, index out of bounds, or a
    /// selector applied to the wrong kind of value), or if the selected value is `null`.
    pub fn evaluate<'v>(&self, document: &'v Value) -> Option<&'v Value> {
        let mut current = document;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Key(key), Value::Object(members)) => members.get(key)?,
                (Segment::Index(index), Value::Array(items)) => {
                    let position = if *index < 0 {
                        items.len().checked_sub(index.unsigned_abs() as usize)?
                    } else {
                        *index as usize
                    };
                    items.get(position)?
                }
                _ => return None,
            };
        }

        (!current.is_null()).then_some(current)
    }

    /// The path as written.
    pub fn as_str(&self) -> &str {
        &self.expr
    }
}

fn parse_bracket<'a>(expr: &str, tail: &'a str) -> Result<(Segment, &'a str), PathError> {
    let unterminated = || PathError::Unterminated(expr.to_owned());

    if let Some(quote) = tail.chars().next().filter(|c| *c == '\'' || *c == '"') {
        let quoted = &tail[1..];
        let end = quoted.find(quote).ok_or_else(unterminated)?;
        let key = &quoted[..end];
        if key.is_empty() {
            return Err(PathError::EmptyKey(expr.to_owned()));
        }
        let rest = quoted[end + 1..].strip_prefix(']').ok_or_else(unterminated)?;
        return Ok((Segment::Key(key.to_owned()), rest));
    }

    let end = tail.find(']').ok_or_else(unterminated)?;
    let raw = tail[..end].trim();
    let index = raw.parse::<i64>().map_err(|_| PathError::InvalidIndex {
        path: expr.to_owned(),
        index: raw.to_owned(),
    })?;
    Ok((Segment::Index(index), &tail[end + 1..]))
}

impl FromStr for ValuePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValuePath::parse(s)
    }
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{PathError, ValuePath};

    #[test]
    fn test_evaluate_known_cases() {
        let document = json!({
            "value": 21.5,
            "state": "ON",
            "nested": { "level": { "deep": true } },
            "readings": [1, 2, { "x": 3 }],
            "dotted.key": 7,
            "nothing": null,
        });

        let cases = &[
            ("$.value", Some(json!(21.5))),
            ("value", Some(json!(21.5))),
            ("$.state", Some(json!("ON"))),
            ("$.nested.level.deep", Some(json!(true))),
            ("nested.level.deep", Some(json!(true))),
            ("$.readings[0]", Some(json!(1))),
            ("$.readings[-1].x", Some(json!(3))),
            ("$['dotted.key']", Some(json!(7))),
            ("$[\"nested\"]['level'].deep", Some(json!(true))),
            ("$.missing", None),
            ("$.nothing", None),
            ("$.readings[7]", None),
            ("$.readings[-4]", None),
            ("$.value.inner", None),
            ("$.nested[0]", None),
        ];

        for (expr, expected) in cases {
            let path = ValuePath::parse(expr).unwrap_or_else(|e| panic!("{expr}: {e}"));
            assert_eq!(path.evaluate(&document).cloned(), *expected, "path: {expr}");
        }
    }

    #[test]
    fn test_root_path() {
        let path = ValuePath::parse("$").unwrap();
        assert_eq!(path.evaluate(&json!(12)).cloned(), Some(json!(12)));
        assert_eq!(path.evaluate(&json!(null)), None);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(ValuePath::parse(""), Err(PathError::Empty));
        assert_eq!(ValuePath::parse("$."), Err(PathError::EmptyKey("$.".to_owned())));
        assert_eq!(ValuePath::parse("$.a..b"), Err(PathError::EmptyKey("$.a..b".to_owned())));
        assert_eq!(ValuePath::parse("$.a[1"), Err(PathError::Unterminated("$.a[1".to_owned())));
        assert_eq!(ValuePath::parse("$['a"), Err(PathError::Unterminated("$['a".to_owned())));
        assert_eq!(ValuePath::parse("$value"), Err(PathError::Unexpected("$value".to_owned())));
        assert!(matches!(ValuePath::parse("$.a[x]"), Err(PathError::InvalidIndex { .. })));
    }

    #[test]
    fn test_display_preserves_expression() {
        let path: ValuePath = "$.a['b'][2]".parse().unwrap();
        assert_eq!(path.to_string(), "$.a['b'][2]");
        assert_eq!(path.as_str(), "$.a['b'][2]");
    }
}
