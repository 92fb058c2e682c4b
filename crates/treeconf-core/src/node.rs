//! Node data stored in the tree arena
//!
//! A node is either a typed value node (leaf) or a container (mapping or
//! sequence). Containers hold child ids; the parent link is a plain id used
//! for flag inheritance and path rendering only.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::interpolation::{value_kind, ValueKind};
use crate::schema::StructSchema;
use crate::types::{EnumType, Key, KeyType, TypeSpec};
use crate::value::Value;

/// Handle to a node inside a `Tree`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Inheritable node flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    /// Rejects mutation of the node and its descendants
    Readonly,
    /// Rejects access to undeclared keys
    Struct,
}

/// Locally set flags; `None` means "inherit from the parent"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Flags {
    readonly: Option<bool>,
    struct_mode: Option<bool>,
}

impl Flags {
    pub(crate) fn get(&self, flag: Flag) -> Option<bool> {
        match flag {
            Flag::Readonly => self.readonly,
            Flag::Struct => self.struct_mode,
        }
    }

    pub(crate) fn set(&mut self, flag: Flag, value: Option<bool>) {
        match flag {
            Flag::Readonly => self.readonly = value,
            Flag::Struct => self.struct_mode = value,
        }
    }

    /// Copy every explicitly set flag of `other` onto `self`
    pub(crate) fn overlay(&mut self, other: &Flags) {
        for flag in [Flag::Readonly, Flag::Struct] {
            if let Some(v) = other.get(flag) {
                self.set(flag, Some(v));
            }
        }
    }
}

/// Scalar type enforced by a value node
#[derive(Debug, Clone)]
pub(crate) enum ValueType {
    Any,
    Bool,
    Int,
    Float,
    Str,
    Enum(Arc<EnumType>),
}

impl ValueType {
    pub(crate) fn from_spec(spec: &TypeSpec) -> Option<Self> {
        match spec {
            TypeSpec::Any => Some(ValueType::Any),
            TypeSpec::Bool => Some(ValueType::Bool),
            TypeSpec::Int => Some(ValueType::Int),
            TypeSpec::Float => Some(ValueType::Float),
            TypeSpec::Str => Some(ValueType::Str),
            TypeSpec::Enum(e) => Some(ValueType::Enum(Arc::clone(e))),
            _ => None,
        }
    }

    fn name(&self) -> &str {
        match self {
            ValueType::Any => "Any",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Str => "str",
            ValueType::Enum(e) => e.name(),
        }
    }

    /// Validate and normalize a value for this type.
    ///
    /// `???` and interpolation strings are stored untouched; null is only
    /// accepted when `optional` is set.
    pub(crate) fn coerce(&self, value: Value, optional: bool) -> Result<Value> {
        if value.is_null() {
            return if optional {
                Ok(Value::Null)
            } else {
                Err(Error::validation(
                    "",
                    "Non optional field cannot be assigned None",
                ))
            };
        }
        if value_kind(&value) != ValueKind::Value {
            return Ok(value);
        }
        if value.is_container() {
            return Err(match self {
                ValueType::Any => Error::unsupported_value_type("", value.type_name()),
                _ => Error::validation(
                    "",
                    format!(
                        "Value of type '{}' could not be converted to {}",
                        value.type_name(),
                        self.name()
                    ),
                ),
            });
        }

        let coerced = match (self, &value) {
            (ValueType::Any, _) => Some(value.clone()),

            (ValueType::Int, Value::Integer(_)) => Some(value.clone()),
            (ValueType::Int, Value::Float(f)) if f.is_finite() && f.fract() == 0.0 => {
                Some(Value::Integer(*f as i64))
            }
            (ValueType::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::Integer),

            (ValueType::Float, Value::Float(_)) => Some(value.clone()),
            (ValueType::Float, Value::Integer(i)) => Some(Value::Float(*i as f64)),
            (ValueType::Float, Value::String(s)) => s.trim().parse::<f64>().ok().map(Value::Float),

            (ValueType::Bool, Value::Bool(_)) => Some(value.clone()),
            (ValueType::Bool, Value::Integer(i)) => Some(Value::Bool(*i != 0)),
            (ValueType::Bool, Value::String(s)) => parse_bool(s).map(Value::Bool),

            (ValueType::Str, Value::String(_)) => Some(value.clone()),
            (ValueType::Str, Value::Enum(e)) => Some(Value::String(e.qualified_name())),
            (ValueType::Str, Value::Bool(_) | Value::Integer(_) | Value::Float(_)) => {
                Some(Value::String(value.to_string()))
            }

            (ValueType::Enum(ty), _) => EnumType::lookup(ty, &value).map(Value::Enum),

            _ => None,
        };

        coerced.ok_or_else(|| {
            let expected = match self {
                ValueType::Enum(ty) => format!("{} (one of [{}])", ty.name(), ty.member_names().join(", ")),
                other => other.name().to_string(),
            };
            Error::validation(
                "",
                format!("Value '{}' could not be converted to {}", value, expected),
            )
        })
    }
}

fn container_kind<T>(content: &Content<T>) -> ValueKind {
    match content {
        Content::Missing | Content::Interpolation(_) => ValueKind::MandatoryMissing,
        Content::Children(_) | Content::Null => ValueKind::Value,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "y" | "yes" | "on" | "true" | "1" => Some(true),
        "n" | "no" | "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Content of a container: children or one of the childless states
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Content<T> {
    Children(T),
    Missing,
    Interpolation(String),
    Null,
}

impl<T> Content<T> {
    /// Childless content for a raw `???`, interpolation or null value
    pub(crate) fn from_raw(raw: &Value) -> Option<Self> {
        match raw {
            Value::Null => Some(Content::Null),
            Value::String(s) => match value_kind(raw) {
                ValueKind::MandatoryMissing => Some(Content::Missing),
                ValueKind::Interpolation | ValueKind::StrInterpolation => {
                    Some(Content::Interpolation(s.clone()))
                }
                ValueKind::Value => None,
            },
            _ => None,
        }
    }

    /// Raw value of a childless content
    pub(crate) fn raw(&self) -> Option<Value> {
        match self {
            Content::Children(_) => None,
            Content::Missing => Some(Value::missing()),
            Content::Interpolation(s) => Some(Value::String(s.clone())),
            Content::Null => Some(Value::Null),
        }
    }

    pub(crate) fn children(&self) -> Option<&T> {
        match self {
            Content::Children(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut T> {
        match self {
            Content::Children(c) => Some(c),
            _ => None,
        }
    }
}

/// Mapping container
#[derive(Debug, Clone)]
pub(crate) struct MapNode {
    pub(crate) content: Content<IndexMap<Key, NodeId>>,
    /// Schema the content was bound from
    pub(crate) object_type: Option<Arc<StructSchema>>,
    pub(crate) key_type: KeyType,
    pub(crate) element_type: TypeSpec,
}

/// Sequence container
#[derive(Debug, Clone)]
pub(crate) struct SeqNode {
    pub(crate) content: Content<Vec<NodeId>>,
    pub(crate) element_type: TypeSpec,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Value(ValueType, Value),
    Map(MapNode),
    Seq(SeqNode),
}

/// One slot of the tree arena
#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) key: Option<Key>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) flags: Flags,
    pub(crate) optional: bool,
    /// Declared type of the slot this node occupies
    pub(crate) declared: TypeSpec,
    pub(crate) kind: NodeKind,
}

impl NodeData {
    pub(crate) fn is_container(&self) -> bool {
        !matches!(self.kind, NodeKind::Value(..))
    }

    pub(crate) fn object_type(&self) -> Option<&Arc<StructSchema>> {
        match &self.kind {
            NodeKind::Map(m) => m.object_type.as_ref(),
            _ => None,
        }
    }

    /// Schema this node is typed with: the bound type, else the declared one
    pub(crate) fn schema_type(&self) -> Option<&Arc<StructSchema>> {
        self.object_type().or_else(|| self.declared.schema())
    }

    /// The raw value of a leaf, or the childless state of a container
    pub(crate) fn raw_scalar(&self) -> Option<Value> {
        match &self.kind {
            NodeKind::Value(_, v) => Some(v.clone()),
            NodeKind::Map(m) => m.content.raw(),
            NodeKind::Seq(s) => s.content.raw(),
        }
    }

    /// Value kind of the node; a container that is missing or still an
    /// interpolation reports missing
    pub(crate) fn kind_of_value(&self) -> ValueKind {
        match &self.kind {
            NodeKind::Value(_, v) => value_kind(v),
            NodeKind::Map(MapNode { content, .. }) => container_kind(content),
            NodeKind::Seq(SeqNode { content, .. }) => container_kind(content),
        }
    }

    /// Direct children in key or index order
    pub(crate) fn child_ids(&self) -> Vec<NodeId> {
        match &self.kind {
            NodeKind::Value(..) => Vec::new(),
            NodeKind::Map(m) => m
                .content
                .children()
                .map(|c| c.values().copied().collect())
                .unwrap_or_default(),
            NodeKind::Seq(s) => s.content.children().cloned().unwrap_or_default(),
        }
    }
}
