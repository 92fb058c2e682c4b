//! Building nodes from primitive values
//!
//! `wrap` turns a `Value` into a subtree shaped by the declared type of the
//! slot it goes into: scalars become typed value nodes, mappings and
//! sequences become containers, structured values are bound through their
//! schema.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::merge::merge_node;
use crate::node::{
    Content, Flag, Flags, MapNode, NodeData, NodeId, NodeKind, SeqNode, ValueType,
};
use crate::schema::{bind, StructSchema, StructValue};
use crate::tree::Tree;
use crate::types::{EnumType, Key, KeyType, TypeSpec};
use crate::value::Value;

/// Where a new node goes
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub(crate) parent: Option<NodeId>,
    pub(crate) key: Option<Key>,
    pub(crate) optional: bool,
    pub(crate) declared: TypeSpec,
}

impl Slot {
    pub(crate) fn root(declared: TypeSpec) -> Self {
        Self {
            parent: None,
            key: None,
            optional: true,
            declared,
        }
    }

    pub(crate) fn child(parent: NodeId, key: Key, declared: TypeSpec, optional: bool) -> Self {
        Self {
            parent: Some(parent),
            key: Some(key),
            optional,
            declared,
        }
    }

    fn path(&self, tree: &Tree) -> String {
        match (self.parent, &self.key) {
            (Some(p), Some(k)) => tree.child_key(p, k),
            _ => String::new(),
        }
    }

    fn data(&self, kind: NodeKind) -> NodeData {
        NodeData {
            key: self.key.clone(),
            parent: self.parent,
            flags: Flags::default(),
            optional: self.optional,
            declared: self.declared.clone(),
            kind,
        }
    }
}

/// Whether children of a container with this element type may hold null
pub(crate) fn element_optional(element: &TypeSpec) -> bool {
    element.is_any()
}

/// Build a subtree for `value` in `slot`
pub(crate) fn wrap(tree: &mut Tree, value: Value, slot: Slot) -> Result<NodeId> {
    let path = slot.path(tree);
    if value.is_null() && !slot.optional {
        return Err(Error::validation(
            path,
            "Non optional field cannot be assigned None",
        ));
    }

    let declared = slot.declared.clone();
    match (&declared, value) {
        (TypeSpec::Struct(schema), value) => wrap_struct(tree, value, schema, slot),
        (TypeSpec::Dict { key, value: element }, value) => {
            wrap_map(tree, value, key.clone(), element, slot)
        }
        (TypeSpec::List(element), value) => wrap_seq(tree, value, element, slot),
        (TypeSpec::Any, Value::Mapping(m)) => {
            wrap_map(tree, Value::Mapping(m), KeyType::Any, &TypeSpec::Any, slot)
        }
        (TypeSpec::Any, Value::Sequence(s)) => {
            wrap_seq(tree, Value::Sequence(s), &TypeSpec::Any, slot)
        }
        (TypeSpec::Any, Value::Struct(sv)) => {
            let schema = Arc::clone(sv.schema());
            wrap_struct(tree, Value::Struct(sv), &schema, slot)
        }
        (scalar, value) => {
            let ty = ValueType::from_spec(scalar)
                .ok_or_else(|| Error::internal(format!("no value type for {}", scalar)))?;
            let value = ty
                .coerce(value, slot.optional)
                .map_err(|e| e.or_path(path))?;
            Ok(tree.insert(slot.data(NodeKind::Value(ty, value))))
        }
    }
}

/// Element type of a container, used for children it does not hold yet
pub(crate) fn element_type(tree: &Tree, id: NodeId) -> TypeSpec {
    match &tree[id].kind {
        NodeKind::Map(m) => m.element_type.clone(),
        NodeKind::Seq(s) => s.element_type.clone(),
        NodeKind::Value(..) => TypeSpec::Any,
    }
}

fn not_a_subclass(path: String, assigned: &StructSchema, expected: &StructSchema) -> Error {
    Error::validation(
        path,
        format!(
            "Invalid type assigned : {} is not a subclass of {}",
            assigned.name(),
            expected.name()
        ),
    )
}

/// Store `value` under `key` of the container `parent`.
///
/// The key must already be validated. An existing typed leaf keeps its type
/// and coerces the value in place; any other existing child is rebuilt in
/// the same slot. New keys are wrapped with the container's element type.
pub(crate) fn assign(tree: &mut Tree, parent: NodeId, key: Key, value: Value) -> Result<()> {
    let path = tree.child_key(parent, &key);
    let target = tree.child(parent, &key);
    let locked = match target {
        Some(t) => tree.is_readonly(t),
        None => tree.is_readonly(parent),
    };
    if locked {
        return Err(Error::readonly(path));
    }

    let Some(target) = target else {
        if !tree.admits_key(parent, &key) {
            return Err(Error::unknown_key(path, &key));
        }
        let element = element_type(tree, parent);
        let optional = element_optional(&element);
        let id = wrap(tree, value, Slot::child(parent, key.clone(), element, optional))?;
        tree.attach(parent, key, id);
        return Ok(());
    };

    let data = &tree[target];
    if let (Some(expected), Value::Struct(sv)) = (data.schema_type(), &value) {
        if !sv.schema().is_subtype_of(expected) {
            return Err(not_a_subclass(path, sv.schema(), expected));
        }
    }
    if let NodeKind::Value(ty, _) = &data.kind {
        if !matches!(ty, ValueType::Any) {
            let coerced = ty.coerce(value, data.optional).map_err(|e| e.or_path(path))?;
            if let NodeKind::Value(_, v) = &mut tree[target].kind {
                *v = coerced;
            }
            return Ok(());
        }
    }

    let declared = match data.schema_type() {
        Some(schema) if data.is_container() => TypeSpec::Struct(Arc::clone(schema)),
        _ => data.declared.clone(),
    };
    let slot = Slot::child(parent, key, declared, data.optional);
    let id = wrap(tree, value, slot)?;
    tree.replace_child(parent, target, id);
    Ok(())
}

/// Convert a mapping key from a primitive value to the container's key type
pub(crate) fn convert_key(key_type: &KeyType, key: Key, path: &str) -> Result<Key> {
    match (key_type, key) {
        (KeyType::Any, k @ (Key::Str(_) | Key::Enum(_))) => Ok(k),
        (KeyType::Str, k @ Key::Str(_)) => Ok(k),
        (KeyType::Enum(ty), Key::Enum(e)) if e.enum_type().name() == ty.name() => Ok(Key::Enum(e)),
        (KeyType::Enum(ty), Key::Str(s)) => EnumType::lookup(ty, &Value::String(s.clone()))
            .map(Key::Enum)
            .ok_or_else(|| {
                Error::key_validation(
                    path,
                    format!(
                        "Key '{}' is not a member of {} (one of [{}])",
                        s,
                        ty.name(),
                        ty.member_names().join(", ")
                    ),
                )
            }),
        (_, k) => Err(Error::key_validation(
            path,
            format!("Key '{}' has the wrong type for this mapping", k),
        )),
    }
}

fn wrap_map(
    tree: &mut Tree,
    value: Value,
    key_type: KeyType,
    element: &TypeSpec,
    slot: Slot,
) -> Result<NodeId> {
    let path = slot.path(tree);
    let map_node = |content| {
        NodeKind::Map(MapNode {
            content,
            object_type: None,
            key_type: key_type.clone(),
            element_type: element.clone(),
        })
    };

    if let Some(content) = Content::from_raw(&value) {
        return Ok(tree.insert(slot.data(map_node(content))));
    }
    let entries = match value {
        Value::Mapping(m) => m,
        Value::Struct(sv) => {
            let schema = Arc::clone(sv.schema());
            return wrap_struct(tree, Value::Struct(sv), &schema, slot);
        }
        other => {
            return Err(Error::validation(
                path,
                format!("Cannot assign a {} to a mapping", other.type_name()),
            ))
        }
    };

    let id = tree.insert(slot.data(map_node(Content::Children(Default::default()))));
    for (k, v) in entries {
        let child = convert_key(&key_type, Key::Str(k), &path).and_then(|key| {
            let child_slot = Slot::child(id, key.clone(), element.clone(), element_optional(element));
            wrap(tree, v, child_slot).map(|c| (key, c))
        });
        match child {
            Ok((key, c)) => tree.attach(id, key, c),
            Err(e) => {
                tree.remove(id);
                return Err(e);
            }
        }
    }
    Ok(id)
}

fn wrap_seq(tree: &mut Tree, value: Value, element: &TypeSpec, slot: Slot) -> Result<NodeId> {
    let path = slot.path(tree);
    let seq_node = |content| {
        NodeKind::Seq(SeqNode {
            content,
            element_type: element.clone(),
        })
    };

    if let Some(content) = Content::from_raw(&value) {
        return Ok(tree.insert(slot.data(seq_node(content))));
    }
    let Value::Sequence(items) = value else {
        return Err(Error::validation(
            path,
            format!("Cannot assign a {} to a sequence", value.type_name()),
        ));
    };

    let id = tree.insert(slot.data(seq_node(Content::Children(Vec::new()))));
    for (i, item) in items.into_iter().enumerate() {
        let child_slot = Slot::child(
            id,
            Key::Index(i as i64),
            element.clone(),
            element_optional(element),
        );
        match wrap(tree, item, child_slot) {
            Ok(c) => tree.attach(id, Key::Index(i as i64), c),
            Err(e) => {
                tree.remove(id);
                return Err(e);
            }
        }
    }
    Ok(id)
}

fn struct_node(
    content: Content<indexmap::IndexMap<Key, NodeId>>,
    object_type: Option<Arc<StructSchema>>,
) -> NodeKind {
    NodeKind::Map(MapNode {
        content,
        object_type,
        key_type: KeyType::Str,
        element_type: TypeSpec::Any,
    })
}

fn wrap_struct(
    tree: &mut Tree,
    value: Value,
    schema: &Arc<StructSchema>,
    slot: Slot,
) -> Result<NodeId> {
    let path = slot.path(tree);

    if let Some(content) = Content::from_raw(&value) {
        return Ok(tree.insert(slot.data(struct_node(content, None))));
    }

    match value {
        Value::Struct(sv) => {
            if !sv.schema().is_subtype_of(schema) {
                return Err(not_a_subclass(path, sv.schema(), schema));
            }
            let id = bind_into(tree, &sv, slot)?;
            if sv.schema().is_frozen() {
                tree[id].flags.set(Flag::Readonly, Some(true));
            }
            Ok(id)
        }
        Value::Mapping(m) => {
            let id = bind_into(tree, &StructValue::new(schema), slot)?;

            let mut overrides = Tree::default();
            let src = match wrap(&mut overrides, Value::Mapping(m), Slot::root(TypeSpec::Any)) {
                Ok(src) => src,
                Err(e) => {
                    tree.remove(id);
                    return Err(e.or_path(path));
                }
            };
            if let Err(e) = merge_node(tree, id, &overrides, src) {
                tree.remove(id);
                return Err(e);
            }
            if schema.is_frozen() {
                tree[id].flags.set(Flag::Readonly, Some(true));
            }
            Ok(id)
        }
        other => Err(Error::validation(
            path,
            format!(
                "Cannot assign a {} to a field of type {}",
                other.type_name(),
                schema.name()
            ),
        )),
    }
}

/// Insert a mapping node holding the bound fields of `instance`
fn bind_into(tree: &mut Tree, instance: &StructValue, slot: Slot) -> Result<NodeId> {
    let path = slot.path(tree);
    let fields = bind(instance).map_err(|e| match &e.path {
        Some(field) if !path.is_empty() => {
            let full = format!("{}.{}", path, field);
            e.with_path(full)
        }
        _ => e.or_path(path.clone()),
    })?;

    let schema = Arc::clone(instance.schema());
    let id = tree.insert(slot.data(struct_node(
        Content::Children(Default::default()),
        Some(Arc::clone(&schema)),
    )));
    log::trace!("binding {} at '{}'", schema.name(), path);

    for field in fields {
        let key = Key::Str(field.name);
        let child_slot = Slot::child(id, key.clone(), field.ty, field.optional);
        match wrap(tree, field.value, child_slot) {
            Ok(c) => tree.attach(id, key, c),
            Err(e) => {
                tree.remove(id);
                return Err(e);
            }
        }
    }
    Ok(id)
}
