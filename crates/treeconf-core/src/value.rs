//! Primitive configuration values
//!
//! `Value` is the data a tree is built from and dumped back to: scalars,
//! enum members, structured (schema-bound) values, sequences and ordered
//! mappings. A string may hold the `???` marker or `${...}` placeholders;
//! the tree gives those their meaning.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::schema::StructValue;
use crate::types::EnumValue;

/// Marker for a value that is required but not supplied yet
pub const MISSING: &str = "???";

/// A configuration value that may contain unresolved interpolations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Null value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// String value (may be `???` or contain interpolations like `${a.b}`)
    String(String),
    /// Member of an enum type
    #[serde(skip_deserializing)]
    Enum(EnumValue),
    /// Instance of a schema, possibly with only some fields set
    #[serde(skip_deserializing)]
    Struct(StructValue),
    /// Sequence of values
    Sequence(Vec<Value>),
    /// Mapping of string keys to values
    Mapping(IndexMap<String, Value>),
}

impl Value {
    /// The `???` marker as a value
    pub fn missing() -> Self {
        Value::String(MISSING.to_string())
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is the `???` marker
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::String(s) if s == MISSING)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Value::Integer(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Value::Float(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::Sequence(_))
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, Value::Mapping(_))
    }

    /// Mappings, sequences and structured values become containers
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Value::Mapping(_) | Value::Sequence(_) | Value::Struct(_)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is a Float or Integer
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Value::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Get a value by path (e.g., "database.host" or "servers[0].name")
    pub fn get_path(&self, path: &str) -> Result<&Value> {
        if path.is_empty() {
            return Ok(self);
        }

        let segments = parse_path(path)?;
        let mut current = self;

        for segment in &segments {
            current = match (segment, current) {
                (PathSegment::Key(key), Value::Mapping(map)) => map
                    .get(key.as_str())
                    .ok_or_else(|| Error::key_not_found(path))?,
                (PathSegment::Key(key), Value::Sequence(seq)) => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|idx| seq.get(idx))
                    .ok_or_else(|| Error::key_not_found(path))?,
                (PathSegment::Index(idx), Value::Sequence(seq)) => {
                    seq.get(*idx).ok_or_else(|| Error::key_not_found(path))?
                }
                _ => return Err(Error::key_not_found(path)),
            };
        }

        Ok(current)
    }

    /// Returns the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Enum(_) => "enum",
            Value::Struct(_) => "struct",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
        }
    }

    /// Scalar equality that treats integers and floats numerically
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::Sequence(a), Value::Sequence(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Mapping(a), Value::Mapping(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).map(|w| v.loose_eq(w)).unwrap_or(false))
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(n) if n.is_nan() => write!(f, "nan"),
            // whole numbers keep a trailing ".0" so they read back as floats
            Value::Float(n) if n.is_finite() && n.fract() == 0.0 => write!(f, "{:.1}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Enum(e) => write!(f, "{}", e),
            Value::Struct(s) => write!(f, "{}", s),
            Value::Sequence(seq) => {
                write!(f, "[")?;
                for (i, v) in seq.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Mapping(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<EnumValue> for Value {
    fn from(e: EnumValue) -> Self {
        Value::Enum(e)
    }
}

impl From<StructValue> for Value {
    fn from(s: StructValue) -> Self {
        Value::Struct(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Sequence(v.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(m: IndexMap<String, Value>) -> Self {
        Value::Mapping(m)
    }
}

/// Collects `(key, value)` pairs into a mapping
impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Mapping(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A segment in a path expression
#[derive(Debug, Clone, PartialEq)]
enum PathSegment {
    /// A key in a mapping (e.g., "database" in "database.host")
    Key(String),
    /// An index in a sequence (e.g., 0 in "servers[0]")
    Index(usize),
}

/// Parse a path string into segments
/// Supports: "key", "key.subkey", "key[0]", "key[0].subkey", "key.0"
fn parse_path(path: &str) -> Result<Vec<PathSegment>> {
    let mut segments = Vec::new();
    let mut current_key = String::new();
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current_key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current_key)));
                }
            }
            '[' => {
                if !current_key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current_key)));
                }
                let index_str: String = chars.by_ref().take_while(|c| *c != ']').collect();
                let idx: usize = index_str.parse().map_err(|_| {
                    Error::key_validation(path, format!("Invalid index in path: {}", index_str))
                })?;
                segments.push(PathSegment::Index(idx));
            }
            ']' => {
                return Err(Error::key_validation(path, "Unexpected ']' in path"));
            }
            _ => current_key.push(c),
        }
    }

    if !current_key.is_empty() {
        segments.push(PathSegment::Key(current_key));
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotted_path() {
        let segments = parse_path("database.host").unwrap();
        assert_eq!(
            segments,
            vec![
                PathSegment::Key("database".into()),
                PathSegment::Key("host".into())
            ]
        );
    }

    #[test]
    fn test_parse_complex_path() {
        let segments = parse_path("servers[0].host").unwrap();
        assert_eq!(
            segments,
            vec![
                PathSegment::Key("servers".into()),
                PathSegment::Index(0),
                PathSegment::Key("host".into())
            ]
        );
    }

    #[test]
    fn test_parse_bad_index() {
        assert!(parse_path("servers[x]").is_err());
        assert!(parse_path("servers]").is_err());
    }

    #[test]
    fn test_value_get_path() {
        let value: Value = [(
            "database",
            Value::from_iter([
                ("host", Value::from("localhost")),
                ("port", Value::from(5432)),
            ]),
        )]
        .into_iter()
        .collect();

        assert_eq!(
            value.get_path("database.host").unwrap().as_str(),
            Some("localhost")
        );
        assert_eq!(
            value.get_path("database.port").unwrap().as_i64(),
            Some(5432)
        );
        assert!(value.get_path("database.user").is_err());
    }

    #[test]
    fn test_value_get_path_array() {
        let value = Value::from_iter([("servers", Value::from(vec!["server1", "server2"]))]);

        assert_eq!(
            value.get_path("servers[1]").unwrap().as_str(),
            Some("server2")
        );
        assert_eq!(
            value.get_path("servers.0").unwrap().as_str(),
            Some("server1")
        );
        assert!(value.get_path("servers[2]").is_err());
    }

    #[test]
    fn test_missing_marker() {
        assert!(Value::missing().is_missing());
        assert!(!Value::from("??").is_missing());
        assert!(!Value::Null.is_missing());
    }

    #[test]
    fn test_loose_eq() {
        assert!(Value::Integer(10).loose_eq(&Value::Float(10.0)));
        assert!(!Value::Integer(10).loose_eq(&Value::Float(10.5)));
        assert!(!Value::Integer(10).loose_eq(&Value::from("10")));
        assert!(Value::from(vec![1, 2]).loose_eq(&Value::Sequence(vec![
            Value::Float(1.0),
            Value::Integer(2)
        ])));
    }

    #[test]
    fn test_deserialize_from_json() {
        let value: Value = serde_json::from_str(r#"{"a": 1, "b": ["x", true], "c": null, "d": 1.5}"#)
            .unwrap();

        assert_eq!(value.get_path("a").unwrap(), &Value::Integer(1));
        assert_eq!(value.get_path("b[1]").unwrap(), &Value::Bool(true));
        assert_eq!(value.get_path("c").unwrap(), &Value::Null);
        assert_eq!(value.get_path("d").unwrap(), &Value::Float(1.5));
    }

    #[test]
    fn test_display() {
        let value = Value::from_iter([("a", Value::from(vec![1, 2])), ("b", Value::Null)]);
        assert_eq!(value.to_string(), "{a: [1, 2], b: null}");

        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(-3.0).to_string(), "-3.0");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(Value::Float(f64::INFINITY).to_string(), "inf");
        assert_eq!(Value::Float(f64::NAN).to_string(), "nan");
    }
}
