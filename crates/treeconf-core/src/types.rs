//! Type annotations carried by nodes
//!
//! `TypeSpec` is the declared type of a slot in the tree (a struct field,
//! a dict value, a list element). Enum types are described at runtime by
//! `EnumType`, with members referenced through `EnumValue`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::schema::StructSchema;
use crate::value::Value;

/// A named enumeration with integer-valued members
#[derive(Debug, PartialEq, Eq)]
pub struct EnumType {
    name: String,
    members: Vec<(String, i64)>,
}

impl EnumType {
    /// Create an enum type from `(member name, value)` pairs
    pub fn new<N, I>(name: impl Into<String>, members: I) -> Arc<Self>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, i64)>,
    {
        Arc::new(Self {
            name: name.into(),
            members: members.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member names in declaration order
    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Look up a member by name
    pub fn member(ty: &Arc<EnumType>, name: &str) -> Option<EnumValue> {
        ty.members
            .iter()
            .find(|(n, _)| n == name)
            .map(|(n, v)| EnumValue {
                ty: Arc::clone(ty),
                name: n.clone(),
                value: *v,
            })
    }

    /// Look up a member by its integer value
    pub fn member_by_value(ty: &Arc<EnumType>, value: i64) -> Option<EnumValue> {
        ty.members
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, v)| EnumValue {
                ty: Arc::clone(ty),
                name: n.clone(),
                value: *v,
            })
    }

    /// Convert a raw value to a member of this enum.
    ///
    /// Accepts a member of the same enum, a member name (`RED` or
    /// `Color.RED`), or an integer member value.
    pub fn lookup(ty: &Arc<EnumType>, raw: &Value) -> Option<EnumValue> {
        match raw {
            Value::Enum(e) if e.ty.name == ty.name => Some(e.clone()),
            Value::String(s) => {
                let name = s
                    .strip_prefix(ty.name.as_str())
                    .and_then(|rest| rest.strip_prefix('.'))
                    .unwrap_or(s.as_str());
                Self::member(ty, name)
            }
            Value::Integer(i) => Self::member_by_value(ty, *i),
            _ => None,
        }
    }
}

/// A member of an `EnumType`
#[derive(Debug, Clone)]
pub struct EnumValue {
    ty: Arc<EnumType>,
    name: String,
    value: i64,
}

impl EnumValue {
    pub fn enum_type(&self) -> &Arc<EnumType> {
        &self.ty
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    /// `Type.MEMBER` form used when the member is rendered as text
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.ty.name, self.name)
    }
}

impl PartialEq for EnumValue {
    fn eq(&self, other: &Self) -> bool {
        self.ty.name == other.ty.name && self.name == other.name
    }
}

impl Eq for EnumValue {}

impl Hash for EnumValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty.name.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified_name())
    }
}

impl Serialize for EnumValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

/// Allowed key type of a mapping container
#[derive(Debug, Clone, Default)]
pub enum KeyType {
    /// String or enum keys
    #[default]
    Any,
    /// String keys only
    Str,
    /// Members of one enum (names are converted)
    Enum(Arc<EnumType>),
}

/// Declared type of a slot in the tree
#[derive(Debug, Clone, Default)]
pub enum TypeSpec {
    #[default]
    Any,
    Bool,
    Int,
    Float,
    Str,
    Enum(Arc<EnumType>),
    Struct(Arc<StructSchema>),
    Dict { key: KeyType, value: Box<TypeSpec> },
    List(Box<TypeSpec>),
}

impl TypeSpec {
    pub fn dict(key: KeyType, value: TypeSpec) -> Self {
        TypeSpec::Dict {
            key,
            value: Box::new(value),
        }
    }

    pub fn list(element: TypeSpec) -> Self {
        TypeSpec::List(Box::new(element))
    }

    pub fn is_any(&self) -> bool {
        matches!(self, TypeSpec::Any)
    }

    /// True for types stored in a value node rather than a container
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            TypeSpec::Any
                | TypeSpec::Bool
                | TypeSpec::Int
                | TypeSpec::Float
                | TypeSpec::Str
                | TypeSpec::Enum(_)
        )
    }

    pub fn schema(&self) -> Option<&Arc<StructSchema>> {
        match self {
            TypeSpec::Struct(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Any => write!(f, "Any"),
            TypeSpec::Bool => write!(f, "bool"),
            TypeSpec::Int => write!(f, "int"),
            TypeSpec::Float => write!(f, "float"),
            TypeSpec::Str => write!(f, "str"),
            TypeSpec::Enum(e) => write!(f, "{}", e.name()),
            TypeSpec::Struct(s) => write!(f, "{}", s.name()),
            TypeSpec::Dict { value, .. } => write!(f, "Dict[{}]", value),
            TypeSpec::List(element) => write!(f, "List[{}]", element),
        }
    }
}

/// Key of a child node: a mapping key or a sequence index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Str(String),
    Enum(EnumValue),
    /// Negative indices count from the end of the sequence
    Index(i64),
}

impl Key {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Text used for mapping keys when the tree is dumped
    pub fn to_key_string(&self) -> String {
        match self {
            Key::Str(s) => s.clone(),
            Key::Enum(e) => e.name().to_string(),
            Key::Index(i) => i.to_string(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_key_string())
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::Str(s.clone())
    }
}

impl From<EnumValue> for Key {
    fn from(e: EnumValue) -> Self {
        Key::Enum(e)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Key::Index(i as i64)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Index(i)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i as i64)
    }
}

impl From<&Key> for Key {
    fn from(k: &Key) -> Self {
        k.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color() -> Arc<EnumType> {
        EnumType::new("Color", [("RED", 1), ("GREEN", 2), ("BLUE", 3)])
    }

    #[test]
    fn test_enum_lookup_by_name_and_value() {
        let color = color();

        let red = EnumType::lookup(&color, &Value::from("RED")).unwrap();
        assert_eq!(red.name(), "RED");
        assert_eq!(red.value(), 1);

        let qualified = EnumType::lookup(&color, &Value::from("Color.GREEN")).unwrap();
        assert_eq!(qualified.name(), "GREEN");

        let by_value = EnumType::lookup(&color, &Value::Integer(3)).unwrap();
        assert_eq!(by_value.name(), "BLUE");

        assert!(EnumType::lookup(&color, &Value::from("PURPLE")).is_none());
        assert!(EnumType::lookup(&color, &Value::Integer(9)).is_none());
        assert!(EnumType::lookup(&color, &Value::Float(1.0)).is_none());
    }

    #[test]
    fn test_enum_lookup_rejects_other_enum() {
        let color = color();
        let shape = EnumType::new("Shape", [("RED", 1)]);
        let other = EnumType::member(&shape, "RED").unwrap();

        assert!(EnumType::lookup(&color, &Value::Enum(other)).is_none());
    }

    #[test]
    fn test_enum_value_display_and_equality() {
        let color = color();
        let a = EnumType::member(&color, "RED").unwrap();
        let b = EnumType::member_by_value(&color, 1).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.to_string(), "Color.RED");
        assert_eq!(color.member_names(), vec!["RED", "GREEN", "BLUE"]);
    }

    #[test]
    fn test_key_conversions() {
        assert_eq!(Key::from("a"), Key::Str("a".into()));
        assert_eq!(Key::from(-1), Key::Index(-1));
        assert_eq!(Key::from(2usize), Key::Index(2));
        assert_eq!(Key::from(3).to_string(), "3");
    }

    #[test]
    fn test_type_spec_display() {
        let spec = TypeSpec::dict(KeyType::Str, TypeSpec::list(TypeSpec::Int));
        assert_eq!(spec.to_string(), "Dict[List[int]]");
        assert!(TypeSpec::Enum(color()).is_scalar());
        assert!(!TypeSpec::list(TypeSpec::Any).is_scalar());
    }
}
