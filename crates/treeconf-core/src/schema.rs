//! Schema description and binding
//!
//! A `StructSchema` is the flat field description of a structured type:
//! ordered fields with a declared type, an optional default and an
//! optional-flag. Host types describe themselves through the `Structured`
//! trait; the tree never looks at them any other way.
//!
//! Binding (`bind`) turns a `StructValue` (a schema plus the field values an
//! instance carries) into the ordered list of children a mapping container
//! is built from.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::{Error, Result};
use crate::types::TypeSpec;
use crate::value::{Value, MISSING};

/// How a field gets its value when an instance does not carry one
#[derive(Clone, Default)]
pub enum FieldDefault {
    /// No default; binding fails unless the field is a nested schema
    #[default]
    None,
    Value(Value),
    /// Called once per binding
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::None => write!(f, "None"),
            FieldDefault::Value(v) => f.debug_tuple("Value").field(v).finish(),
            FieldDefault::Factory(_) => write!(f, "Factory(..)"),
        }
    }
}

/// A single declared field
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    ty: TypeSpec,
    default: FieldDefault,
    optional: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: TypeSpec) -> Self {
        Self {
            name: name.into(),
            ty,
            default: FieldDefault::None,
            optional: false,
        }
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = FieldDefault::Value(value.into());
        self
    }

    /// Field left as `???` until populated
    pub fn mandatory(self) -> Self {
        self.default(MISSING)
    }

    pub fn default_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = FieldDefault::Factory(Arc::new(factory));
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &TypeSpec {
        &self.ty
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    fn default_value(&self) -> Option<Value> {
        match &self.default {
            FieldDefault::None => None,
            FieldDefault::Value(v) => Some(v.clone()),
            FieldDefault::Factory(f) => Some(f()),
        }
    }
}

/// Field description of a structured type
#[derive(Debug)]
pub struct StructSchema {
    name: String,
    base: Option<Arc<StructSchema>>,
    fields: Vec<Field>,
    frozen: bool,
    dict_compatible: bool,
}

impl StructSchema {
    pub fn builder(name: impl Into<String>) -> StructSchemaBuilder {
        StructSchemaBuilder {
            schema: StructSchema {
                name: name.into(),
                base: None,
                fields: Vec::new(),
                frozen: false,
                dict_compatible: false,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> Option<&Arc<StructSchema>> {
        self.base.as_ref()
    }

    /// All fields, inherited ones first
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Bound containers are read-only
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Accepts keys it does not declare, like a plain dict
    pub fn is_dict_compatible(&self) -> bool {
        self.dict_compatible
    }

    /// True if `self` is `other` or derives from it
    pub fn is_subtype_of(&self, other: &StructSchema) -> bool {
        let mut current = Some(self);
        while let Some(schema) = current {
            if schema.name == other.name {
                return true;
            }
            current = schema.base.as_deref();
        }
        false
    }
}

/// Builder for `StructSchema`
pub struct StructSchemaBuilder {
    schema: StructSchema,
}

impl StructSchemaBuilder {
    /// Inherit the fields of `base`; later fields with the same name override
    pub fn extends(mut self, base: &Arc<StructSchema>) -> Self {
        self.schema.fields = base.fields.clone();
        self.schema.frozen = base.frozen;
        self.schema.dict_compatible = base.dict_compatible;
        self.schema.base = Some(Arc::clone(base));
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        match self.schema.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.schema.fields.push(field),
        }
        self
    }

    pub fn frozen(mut self) -> Self {
        self.schema.frozen = true;
        self
    }

    pub fn dict_compatible(mut self) -> Self {
        self.schema.dict_compatible = true;
        self
    }

    pub fn build(self) -> Arc<StructSchema> {
        Arc::new(self.schema)
    }
}

/// An instance of a schema: the schema plus whatever field values it carries.
///
/// An instance with no values is the "unbound" form of the type; binding it
/// yields the schema defaults.
#[derive(Debug, Clone)]
pub struct StructValue {
    schema: Arc<StructSchema>,
    values: IndexMap<String, Value>,
}

impl StructValue {
    pub fn new(schema: &Arc<StructSchema>) -> Self {
        Self {
            schema: Arc::clone(schema),
            values: IndexMap::new(),
        }
    }

    /// Set a field value, builder style
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn schema(&self) -> &Arc<StructSchema> {
        &self.schema
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }
}

impl PartialEq for StructValue {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name == other.schema.name && self.values == other.values
    }
}

impl fmt::Display for StructValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.schema.name)?;
        for (i, (k, v)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        write!(f, ")")
    }
}

impl Serialize for StructValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in &self.values {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Implemented by host types that can be turned into a configuration
pub trait Structured {
    /// Field description of the type
    fn schema() -> Arc<StructSchema>;

    /// Field values of this instance
    fn to_struct_value(&self) -> StructValue;
}

/// One bound field, ready to be wrapped into a node
#[derive(Debug, Clone)]
pub struct BoundField {
    pub name: String,
    pub ty: TypeSpec,
    pub optional: bool,
    pub value: Value,
}

/// Resolve the initial value of every field of `instance`.
///
/// Per field: the instance's own value, else the default (value or
/// factory), else an unbound instance of a nested schema. A field with none
/// of these cannot be bound.
pub fn bind(instance: &StructValue) -> Result<Vec<BoundField>> {
    let schema = &instance.schema;

    if let Some(unknown) = instance.values.keys().find(|k| schema.field(k).is_none()) {
        if !schema.dict_compatible {
            return Err(Error::validation(
                "",
                format!("'{}' has no field named '{}'", schema.name, unknown),
            ));
        }
    }

    let mut bound = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        let value = match instance.values.get(&field.name) {
            Some(v) => v.clone(),
            None => match (field.default_value(), &field.ty) {
                (Some(v), _) => v,
                (None, TypeSpec::Struct(nested)) => Value::Struct(StructValue::new(nested)),
                (None, _) => {
                    return Err(Error::schema(
                        field.name.clone(),
                        format!(
                            "Missing default value for {}, to indicate default must be populated later use '{}'",
                            field.name, MISSING
                        ),
                    ))
                }
            },
        };
        log::trace!("bound {}.{} = {}", schema.name, field.name, value);
        bound.push(BoundField {
            name: field.name.clone(),
            ty: field.ty.clone(),
            optional: field.optional,
            value,
        });
    }

    // dict-compatible instances may carry extra keys
    for (k, v) in &instance.values {
        if schema.field(k).is_none() {
            bound.push(BoundField {
                name: k.clone(),
                ty: TypeSpec::Any,
                optional: true,
                value: v.clone(),
            });
        }
    }

    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn user() -> Arc<StructSchema> {
        StructSchema::builder("User")
            .field(Field::new("name", TypeSpec::Str).mandatory())
            .field(Field::new("age", TypeSpec::Int).mandatory())
            .build()
    }

    #[test]
    fn test_bind_uses_instance_then_default() {
        let schema = user();
        let bound = bind(&StructValue::new(&schema).with("name", "Bond")).unwrap();

        let values: Vec<(&str, &Value)> =
            bound.iter().map(|b| (b.name.as_str(), &b.value)).collect();
        assert_eq!(
            values,
            vec![("name", &Value::from("Bond")), ("age", &Value::missing())]
        );
    }

    #[test]
    fn test_bind_nested_schema_without_default() {
        let owner = user();
        let group = StructSchema::builder("Group")
            .field(Field::new("admin", TypeSpec::Struct(owner.clone())))
            .build();

        let bound = bind(&StructValue::new(&group)).unwrap();
        assert_eq!(bound[0].value, Value::Struct(StructValue::new(&owner)));
    }

    #[test]
    fn test_bind_field_without_default_fails() {
        let schema = StructSchema::builder("Server")
            .field(Field::new("port", TypeSpec::Int))
            .build();

        let err = bind(&StructValue::new(&schema)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Schema);
        assert!(err.to_string().contains("Missing default value for port"));
    }

    #[test]
    fn test_bind_factory_default() {
        let schema = StructSchema::builder("Paths")
            .field(Field::new("list", TypeSpec::list(TypeSpec::Str)).default_factory(|| Value::from(vec!["a"])))
            .build();

        let bound = bind(&StructValue::new(&schema)).unwrap();
        assert_eq!(bound[0].value, Value::from(vec!["a"]));
    }

    #[test]
    fn test_bind_unknown_field_fails() {
        let err = bind(&StructValue::new(&user()).with("email", "x")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_subtype_chain() {
        let plugin = StructSchema::builder("Plugin")
            .field(Field::new("name", TypeSpec::Str).mandatory())
            .build();
        let concrete = StructSchema::builder("ConcretePlugin")
            .extends(&plugin)
            .field(Field::new("foo", TypeSpec::Int).default(10))
            .build();

        assert!(concrete.is_subtype_of(&plugin));
        assert!(!plugin.is_subtype_of(&concrete));
        assert!(!user().is_subtype_of(&plugin));

        let names: Vec<&str> = concrete.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["name", "foo"]);
    }

    #[test]
    fn test_extends_overrides_default() {
        let base = StructSchema::builder("Base")
            .field(Field::new("x", TypeSpec::Int).default(1))
            .build();
        let child = StructSchema::builder("Child")
            .extends(&base)
            .field(Field::new("x", TypeSpec::Int).default(2))
            .build();

        let bound = bind(&StructValue::new(&child)).unwrap();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].value, Value::Integer(2));
    }
}
