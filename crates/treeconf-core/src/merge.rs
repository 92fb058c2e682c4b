//! Merging configuration trees
//!
//! Merging walks an override tree and folds it into a destination tree:
//! mappings merge key by key, sequences are replaced wholesale and leaves
//! take the override's value (coerced to the destination's type when the
//! destination is typed). Callers merge into a copy and swap it in on
//! success, so a failed merge leaves the destination untouched.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::node::{NodeId, NodeKind, ValueType};
use crate::schema::{StructSchema, StructValue};
use crate::tree::{ContentState, Tree};
use crate::types::Key;
use crate::value::Value;
use crate::wrap::{assign, convert_key, element_optional, element_type, wrap, Slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Leaf,
    Map,
    Seq,
}

impl Shape {
    fn of(tree: &Tree, id: NodeId) -> Self {
        match tree[id].kind {
            NodeKind::Value(..) => Shape::Leaf,
            NodeKind::Map(_) => Shape::Map,
            NodeKind::Seq(_) => Shape::Seq,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Shape::Leaf => "a value",
            Shape::Map => "a mapping",
            Shape::Seq => "a sequence",
        }
    }
}

/// Whether a container holds children (as opposed to null, `???` or an
/// interpolation)
fn has_children(tree: &Tree, id: NodeId) -> bool {
    match &tree[id].kind {
        NodeKind::Map(m) => m.content.children().is_some(),
        NodeKind::Seq(s) => s.content.children().is_some(),
        NodeKind::Value(..) => false,
    }
}

fn content_state(tree: &Tree, id: NodeId) -> ContentState {
    match &tree[id].kind {
        NodeKind::Map(m) => ContentState::of(&m.content),
        NodeKind::Seq(s) => ContentState::of(&s.content),
        NodeKind::Value(..) => ContentState::Empty,
    }
}

/// Merge the subtree `s` of `src` into the container `d` of `dest`
pub(crate) fn merge_node(dest: &mut Tree, d: NodeId, src: &Tree, s: NodeId) -> Result<()> {
    if dest.is_readonly(d) {
        return Err(Error::readonly(dest.full_key(d)));
    }

    match (Shape::of(dest, d), Shape::of(src, s)) {
        (Shape::Map, Shape::Map) if has_children(src, s) => merge_map(dest, d, src, s),
        (Shape::Seq, Shape::Seq) if has_children(src, s) => merge_seq(dest, d, src, s),
        (Shape::Map, Shape::Map) | (Shape::Seq, Shape::Seq) => {
            assign_state(dest, d, content_state(src, s))?;
            let flags = src[s].flags.clone();
            dest[d].flags.overlay(&flags);
            Ok(())
        }
        (to, from) => Err(Error::type_mismatch(
            dest.full_key(d),
            format!("Cannot merge {} into {}", from.name(), to.name()),
        )),
    }
}

/// Give a container the childless state of an override
fn assign_state(dest: &mut Tree, d: NodeId, state: ContentState) -> Result<()> {
    match state {
        // `???` never clobbers what is already there
        ContentState::Missing => Ok(()),
        ContentState::Null if !dest[d].optional => Err(Error::validation(
            dest.full_key(d),
            "Non optional field cannot be assigned None",
        )),
        state => {
            dest.reset_content(d, state);
            Ok(())
        }
    }
}

/// Give a childless mapping children to merge into: the prototype of its
/// schema when it is typed, an empty mapping otherwise
pub(crate) fn expand(tree: &mut Tree, id: NodeId) -> Result<()> {
    if has_children(tree, id) {
        return Ok(());
    }
    let data = &tree[id];
    let schema = match &data.kind {
        NodeKind::Map(_) => data.schema_type().cloned(),
        _ => None,
    };
    match schema {
        Some(schema) => {
            let slot = Slot {
                parent: data.parent,
                key: data.key.clone(),
                optional: data.optional,
                declared: data.declared.clone(),
            };
            log::trace!("expanding '{}' from {}", tree.full_key(id), schema.name());
            let proto = wrap(tree, Value::Struct(StructValue::new(&schema)), slot)?;
            tree.transplant(proto, id);
        }
        None => tree.reset_content(id, ContentState::Empty),
    }
    Ok(())
}

fn merge_map(dest: &mut Tree, d: NodeId, src: &Tree, s: NodeId) -> Result<()> {
    let path = dest.full_key(d);
    let src_type: Option<Arc<StructSchema>> = src[s].object_type().cloned();
    if let (Some(dest_type), Some(src_type)) = (dest[d].schema_type(), &src_type) {
        if !src_type.is_subtype_of(dest_type) {
            return Err(Error::validation(
                path,
                format!(
                    "Merge error : {} is not a subclass of {}",
                    src_type.name(),
                    dest_type.name()
                ),
            ));
        }
    }

    expand(dest, d)?;
    if let Some(src_type) = src_type.filter(|t| !t.is_dict_compatible()) {
        if let NodeKind::Map(m) = &mut dest[d].kind {
            m.object_type = Some(src_type);
        }
    }

    let key_type = match &dest[d].kind {
        NodeKind::Map(m) => m.key_type.clone(),
        _ => Default::default(),
    };
    let entries: Vec<(Key, NodeId)> = match &src[s].kind {
        NodeKind::Map(m) => m
            .content
            .children()
            .map(|c| c.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    for (key, sc) in entries {
        let key = convert_key(&key_type, key, &path)?;
        match dest.child(d, &key) {
            Some(dc) => merge_child(dest, d, key, dc, src, sc)?,
            None => add_child(dest, d, key, src, sc)?,
        }
    }

    let flags = src[s].flags.clone();
    dest[d].flags.overlay(&flags);
    log::trace!("merged mapping into '{}'", path);
    Ok(())
}

fn merge_child(
    dest: &mut Tree,
    d: NodeId,
    key: Key,
    dc: NodeId,
    src: &Tree,
    sc: NodeId,
) -> Result<()> {
    let (to, from) = (Shape::of(dest, dc), Shape::of(src, sc));
    match (to, from) {
        (Shape::Leaf, Shape::Leaf) => merge_leaf(dest, dc, src, sc),
        (Shape::Leaf, _) => {
            if dest[dc].declared.is_any() {
                replace_with_copy(dest, dc, src, sc)
            } else {
                Err(Error::validation(
                    dest.full_key(dc),
                    format!(
                        "Cannot merge {} into a field of type {}",
                        from.name(),
                        dest[dc].declared
                    ),
                ))
            }
        }
        (_, Shape::Leaf) => {
            let value = src.raw_value(sc);
            if value.is_missing() {
                return Ok(());
            }
            assign(dest, d, key, value)
        }
        _ if to == from => merge_node(dest, dc, src, sc),
        _ if dest[dc].declared.is_any() && dest[dc].schema_type().is_none() => {
            replace_with_copy(dest, dc, src, sc)
        }
        _ => Err(Error::type_mismatch(
            dest.full_key(dc),
            format!("Cannot merge {} into {}", from.name(), to.name()),
        )),
    }
}

fn merge_leaf(dest: &mut Tree, dc: NodeId, src: &Tree, sc: NodeId) -> Result<()> {
    if dest.is_readonly(dc) {
        return Err(Error::readonly(dest.full_key(dc)));
    }
    let value = src.raw_value(sc);
    if value.is_missing() {
        return Ok(());
    }

    let path = dest.full_key(dc);
    let optional = dest[dc].optional;
    if matches!(dest[dc].kind, NodeKind::Value(ValueType::Any, _)) {
        if value.is_null() && !optional {
            return Err(Error::validation(
                path,
                "Non optional field cannot be assigned None",
            ));
        }
        return replace_with_copy(dest, dc, src, sc);
    }

    if let NodeKind::Value(ty, current) = &mut dest[dc].kind {
        *current = ty.coerce(value, optional).map_err(|e| e.or_path(path))?;
    }
    let flags = src[sc].flags.clone();
    dest[dc].flags.overlay(&flags);
    Ok(())
}

/// Replace `dc` with a copy of the override node, keeping the slot's
/// declared type and optionality
fn replace_with_copy(dest: &mut Tree, dc: NodeId, src: &Tree, sc: NodeId) -> Result<()> {
    if dest.is_readonly(dc) {
        return Err(Error::readonly(dest.full_key(dc)));
    }
    let old = &dest[dc];
    let (parent, key, optional, declared) = (
        old.parent,
        old.key.clone(),
        old.optional,
        old.declared.clone(),
    );
    let Some(parent) = parent else {
        return Err(Error::internal("cannot replace the root node while merging"));
    };

    let new = dest.copy_from(src, sc, Some(parent), key);
    dest[new].optional = optional;
    dest[new].declared = declared;
    dest.replace_child(parent, dc, new);
    Ok(())
}

fn add_child(dest: &mut Tree, d: NodeId, key: Key, src: &Tree, sc: NodeId) -> Result<()> {
    if !dest.admits_key(d, &key) {
        return Err(Error::unknown_key(dest.child_key(d, &key), &key));
    }

    let element = element_type(dest, d);
    if element.is_any() {
        let new = dest.copy_from(src, sc, Some(d), Some(key.clone()));
        dest.attach(d, key, new);
        return Ok(());
    }

    let slot = Slot::child(d, key.clone(), element.clone(), element_optional(&element));
    let new = match src[sc].object_type() {
        Some(schema) if has_children(src, sc) => {
            let id = wrap(dest, Value::Struct(StructValue::new(schema)), slot)?;
            if let Err(e) = merge_node(dest, id, src, sc) {
                dest.remove(id);
                return Err(e);
            }
            id
        }
        _ => wrap(dest, src.raw_value(sc), slot)?,
    };
    dest.attach(d, key, new);
    Ok(())
}

fn merge_seq(dest: &mut Tree, d: NodeId, src: &Tree, s: NodeId) -> Result<()> {
    let element = element_type(dest, d);
    let items = src[s].child_ids();

    let mut built = Vec::with_capacity(items.len());
    for (i, sc) in items.into_iter().enumerate() {
        let key = Key::Index(i as i64);
        let item = if element.is_any() {
            Ok(dest.copy_from(src, sc, Some(d), Some(key)))
        } else {
            let slot = Slot::child(d, key, element.clone(), element_optional(&element));
            wrap(dest, src.raw_value(sc), slot)
        };
        match item {
            Ok(id) => built.push(id),
            Err(e) => {
                for id in built {
                    dest.remove(id);
                }
                return Err(e);
            }
        }
    }

    dest.reset_content(d, ContentState::Empty);
    for (i, id) in built.into_iter().enumerate() {
        dest.attach(d, Key::Index(i as i64), id);
    }
    let flags = src[s].flags.clone();
    dest[d].flags.overlay(&flags);
    log::trace!("replaced sequence '{}'", dest.full_key(d));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{merge, merge_values, Config};
    use crate::error::ErrorKind;
    use crate::schema::Field;
    use crate::types::TypeSpec;
    use pretty_assertions::assert_eq;

    fn user() -> Arc<StructSchema> {
        StructSchema::builder("User")
            .field(Field::new("name", TypeSpec::Str).mandatory())
            .field(Field::new("age", TypeSpec::Int).mandatory())
            .build()
    }

    fn group() -> Arc<StructSchema> {
        StructSchema::builder("Group")
            .field(Field::new("admin", TypeSpec::Struct(user())).optional().default(Value::Null))
            .build()
    }

    fn users() -> Arc<StructSchema> {
        StructSchema::builder("Users")
            .field(
                Field::new("name2user", TypeSpec::dict(Default::default(), TypeSpec::Struct(user())))
                    .default_factory(|| Value::Mapping(Default::default())),
            )
            .build()
    }

    fn plugin() -> Arc<StructSchema> {
        StructSchema::builder("Plugin")
            .field(Field::new("name", TypeSpec::Str).mandatory())
            .field(Field::new("params", TypeSpec::Any).mandatory())
            .build()
    }

    fn concrete_plugin() -> Arc<StructSchema> {
        let params = StructSchema::builder("FoobarParams")
            .field(Field::new("foo", TypeSpec::Int).default(10))
            .build();
        StructSchema::builder("ConcretePlugin")
            .extends(&plugin())
            .field(Field::new("name", TypeSpec::Str).default("foobar_plugin"))
            .field(Field::new("params", TypeSpec::Struct(params)))
            .build()
    }

    fn mapping(pairs: Vec<(&str, Value)>) -> Value {
        pairs.into_iter().collect()
    }

    fn merged(inputs: Vec<Value>) -> Config {
        merge_values(&inputs).unwrap()
    }

    #[test]
    fn test_merge_adds_keys() {
        let cfg = merged(vec![mapping(vec![]), mapping(vec![("a", 1.into())])]);
        assert_eq!(cfg, mapping(vec![("a", 1.into())]));

        let cfg = merged(vec![
            mapping(vec![("a", Value::Null)]),
            mapping(vec![("b", Value::Null)]),
        ]);
        assert_eq!(cfg, mapping(vec![("a", Value::Null), ("b", Value::Null)]));
    }

    #[test]
    fn test_merge_nested_maps_keep_keys() {
        let cfg = merged(vec![
            mapping(vec![("a", mapping(vec![("a1", 1.into()), ("a2", 2.into())]))]),
            mapping(vec![("a", mapping(vec![("a1", 2.into())]))]),
        ]);
        assert_eq!(
            cfg,
            mapping(vec![("a", mapping(vec![("a1", 2.into()), ("a2", 2.into())]))])
        );
    }

    #[test]
    fn test_merge_replaces_leaf_and_container() {
        let cfg = merged(vec![
            mapping(vec![("a", 1.into()), ("b", 2.into())]),
            mapping(vec![("b", mapping(vec![("c", 3.into())]))]),
        ]);
        assert_eq!(
            cfg,
            mapping(vec![("a", 1.into()), ("b", mapping(vec![("c", 3.into())]))])
        );

        let cfg = merged(vec![
            mapping(vec![("b", mapping(vec![("c", 1.into())]))]),
            mapping(vec![("b", 1.into())]),
        ]);
        assert_eq!(cfg, mapping(vec![("b", 1.into())]));
    }

    #[test]
    fn test_merge_replaces_sequences() {
        let cfg = merged(vec![
            mapping(vec![("list", vec![1, 2, 3].into())]),
            mapping(vec![("list", vec![4, 5, 6].into())]),
        ]);
        assert_eq!(cfg, mapping(vec![("list", vec![4, 5, 6].into())]));

        let cfg = merged(vec![
            Value::Sequence(vec![1.into(), 2.into(), mapping(vec![("a", 10.into())])]),
            Value::Sequence(vec![4.into(), 5.into(), mapping(vec![("b", 20.into())])]),
        ]);
        assert_eq!(
            cfg,
            Value::Sequence(vec![4.into(), 5.into(), mapping(vec![("b", 20.into())])])
        );
    }

    #[test]
    fn test_merge_then_interpolate() {
        let cfg = merged(vec![
            mapping(vec![("data", 123.into()), ("reference", "${data}".into())]),
            mapping(vec![("data", 456.into())]),
        ]);
        assert_eq!(cfg.get("reference").unwrap(), Value::Integer(456));

        let cfg = merged(vec![
            mapping(vec![("missing", 123.into())]),
            mapping(vec![("missing", "${data}".into())]),
            mapping(vec![("missing", 456.into())]),
        ]);
        assert_eq!(cfg, mapping(vec![("missing", 456.into())]));
    }

    #[test]
    fn test_merge_replaces_interpolation_unresolved() {
        let cfg = merged(vec![
            mapping(vec![("missing", "${data}".into())]),
            mapping(vec![("missing", 123.into())]),
        ]);
        assert_eq!(cfg, mapping(vec![("missing", 123.into())]));
        assert_eq!(cfg.get("missing").unwrap(), Value::Integer(123));
    }

    #[test]
    fn test_merge_into_struct_field() {
        let unbound = Value::Struct(StructValue::new(&user()));
        let expected = mapping(vec![(
            "user",
            Value::Struct(
                StructValue::new(&user())
                    .with("name", Value::missing())
                    .with("age", Value::missing()),
            ),
        )]);

        let cfg = merged(vec![mapping(vec![("user", unbound.clone())]), mapping(vec![])]);
        assert_eq!(cfg, expected);

        let cfg = merged(vec![
            mapping(vec![("user", unbound.clone())]),
            mapping(vec![("user", mapping(vec![]))]),
        ]);
        assert_eq!(cfg, expected);

        let cfg = merged(vec![
            mapping(vec![("user", unbound)]),
            mapping(vec![("user", mapping(vec![("name", "Joe".into()), ("age", 10.into())]))]),
        ]);
        assert_eq!(
            cfg,
            mapping(vec![(
                "user",
                Value::Struct(StructValue::new(&user()).with("name", "Joe").with("age", 10)),
            )])
        );
    }

    #[test]
    fn test_merge_typed_dict_elements() {
        let base = Value::Struct(StructValue::new(&users()));

        let cfg = merged(vec![base.clone()]);
        assert_eq!(cfg, mapping(vec![("name2user", mapping(vec![]))]));

        let cfg = merged(vec![
            base.clone(),
            mapping(vec![(
                "name2user",
                mapping(vec![("joe", Value::Struct(StructValue::new(&user())))]),
            )]),
        ]);
        assert_eq!(
            cfg,
            mapping(vec![(
                "name2user",
                mapping(vec![(
                    "joe",
                    mapping(vec![("name", Value::missing()), ("age", Value::missing())])
                )])
            )])
        );

        let cfg = merged(vec![
            base,
            mapping(vec![(
                "name2user",
                mapping(vec![("joe", mapping(vec![("name", "joe".into())]))]),
            )]),
        ]);
        assert_eq!(
            cfg,
            mapping(vec![(
                "name2user",
                mapping(vec![(
                    "joe",
                    mapping(vec![("name", "joe".into()), ("age", Value::missing())])
                )])
            )])
        );
        let joe = cfg.select("name2user.joe").unwrap().unwrap();
        assert_eq!(
            joe.as_container().and_then(|c| c.object_type()).map(|s| s.name().to_string()),
            Some("User".to_string())
        );
    }

    #[test]
    fn test_merge_struct_value_into_typed_dict() {
        let cfg = merged(vec![
            Value::Struct(StructValue::new(&users())),
            mapping(vec![(
                "name2user",
                mapping(vec![("joe", Value::Struct(StructValue::new(&user()).with("name", "joe")))]),
            )]),
        ]);
        assert_eq!(
            cfg,
            mapping(vec![(
                "name2user",
                mapping(vec![(
                    "joe",
                    mapping(vec![("name", "joe".into()), ("age", Value::missing())])
                )])
            )])
        );
        let joe = cfg.select("name2user.joe").unwrap().unwrap();
        let joe = joe.as_container().unwrap();
        assert_eq!(joe.object_type().map(|s| s.name()), Some("User"));
        assert!(joe.is_missing("age"));
    }

    #[test]
    fn test_merge_missing_typed_dict() {
        let schema = StructSchema::builder("ConfWithMissingDict")
            .field(Field::new("dict", TypeSpec::dict(Default::default(), TypeSpec::Str)).mandatory())
            .build();
        let base = Value::Struct(StructValue::new(&schema));

        let cfg = merged(vec![
            base.clone(),
            mapping(vec![("dict", mapping(vec![("foo", "bar".into())]))]),
        ]);
        assert_eq!(cfg, mapping(vec![("dict", mapping(vec![("foo", "bar".into())]))]));

        let cfg = merged(vec![mapping(vec![]), base]);
        assert_eq!(cfg, mapping(vec![("dict", Value::missing())]));
    }

    #[test]
    fn test_merge_incompatible_struct_fails() {
        let err = merge_values(&[
            mapping(vec![("user", Value::Struct(StructValue::new(&user())))]),
            mapping(vec![("user", Value::Struct(StructValue::new(&group())))]),
        ])
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_merge_subtype_retypes() {
        let cfg = merged(vec![
            Value::Struct(StructValue::new(&plugin())),
            Value::Struct(StructValue::new(&concrete_plugin())),
        ]);
        assert_eq!(cfg, Value::Struct(StructValue::new(&concrete_plugin())));
        assert_eq!(
            cfg.root().object_type().map(|s| s.name().to_string()),
            Some("ConcretePlugin".to_string())
        );
    }

    #[test]
    fn test_merge_unknown_key_into_struct() {
        let err = merge_values(&[
            Value::Struct(StructValue::new(&user())),
            mapping(vec![("email", "joe@example.com".into())]),
        ])
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownKey);
    }

    #[test]
    fn test_merge_coerces_typed_leaf() {
        let cfg = merged(vec![
            Value::Struct(StructValue::new(&user()).with("age", 1)),
            mapping(vec![("age", "42".into())]),
        ]);
        assert_eq!(cfg.get("age").unwrap(), Value::Integer(42));

        let err = merge_values(&[
            Value::Struct(StructValue::new(&user()).with("age", 1)),
            mapping(vec![("age", "old".into())]),
        ])
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.path.as_deref(), Some("age"));
    }

    #[test]
    fn test_merge_typed_node_overrides() {
        let counter = StructSchema::builder("Counter")
            .field(Field::new("a", TypeSpec::Int).default(10))
            .build();

        let mut cfg = merged(vec![
            mapping(vec![("a", 1.into())]),
            Value::Struct(StructValue::new(&counter)),
        ]);
        assert_eq!(cfg, mapping(vec![("a", 10.into())]));
        assert_eq!(cfg.set("a", "ten").unwrap_err().kind, ErrorKind::Validation);

        let mut cfg = merged(vec![
            Value::Struct(StructValue::new(&counter)),
            mapping(vec![("a", 1.into())]),
        ]);
        assert_eq!(cfg, mapping(vec![("a", 1.into())]));
        cfg.set("a", "12").unwrap();
        assert_eq!(cfg.get("a").unwrap(), Value::Integer(12));
        assert_eq!(cfg.set("a", "ten").unwrap_err().kind, ErrorKind::Validation);
    }

    #[test]
    fn test_missing_override_keeps_value() {
        let cfg = merged(vec![
            mapping(vec![("a", 1.into()), ("b", mapping(vec![("c", 2.into())]))]),
            mapping(vec![("a", Value::missing()), ("b", Value::missing())]),
        ]);
        assert_eq!(
            cfg,
            mapping(vec![("a", 1.into()), ("b", mapping(vec![("c", 2.into())]))])
        );
    }

    #[test]
    fn test_merge_shape_errors() {
        let err = merge_values(&[mapping(vec![]), Value::Sequence(vec![])]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);

        let err = merge_values(&[Value::Sequence(vec![]), mapping(vec![])]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);
    }

    #[test]
    fn test_merge_with_null_fails() {
        let err = merge_values(&[vec![1, 2, 3].into(), Value::Null]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Value);

        let err = merge_values(&[mapping(vec![("a", 10.into())]), Value::Null]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Value);
        assert!(err.help.is_some());
    }

    #[test]
    fn test_merge_into_readonly() {
        let mut cfg = Config::create(mapping(vec![("foo", "bar".into())])).unwrap();
        cfg.set_readonly(true);
        let other = Config::create(mapping(vec![("zoo", "foo".into())])).unwrap();

        let err = merge(&cfg, &[&other]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ReadonlyConfig);

        let mut list = Config::create(vec![1, 2, 3]).unwrap();
        list.set_readonly(true);
        let other = Config::create(vec![4, 5, 6]).unwrap();
        let err = list.merge_with(&other).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ReadonlyConfig);
        assert_eq!(list, Value::from(vec![1, 2, 3]));
    }

    #[test]
    fn test_merge_leaves_inputs_untouched() {
        let a = Config::create(mapping(vec![("a", mapping(vec![("b", 10.into())]))])).unwrap();
        let b = Config::create(mapping(vec![("a", mapping(vec![("c", 20.into())]))])).unwrap();

        let c = merge(&a, &[&b]).unwrap();
        assert_eq!(
            c,
            mapping(vec![("a", mapping(vec![("b", 10.into()), ("c", 20.into())]))])
        );
        assert_eq!(a, mapping(vec![("a", mapping(vec![("b", 10.into())]))]));
        assert_eq!(b, mapping(vec![("a", mapping(vec![("c", 20.into())]))]));
    }

    #[test]
    fn test_three_way_merge() {
        let c1 = Config::create(mapping(vec![("a", 1.into()), ("b", 2.into())])).unwrap();
        let c2 = Config::create(mapping(vec![("b", 3.into())])).unwrap();
        let c3 = Config::create(mapping(vec![("a", 2.into()), ("c", 3.into())])).unwrap();

        let merged = merge(&c1, &[&c2, &c3]).unwrap();
        assert_eq!(
            merged,
            mapping(vec![("a", 2.into()), ("b", 3.into()), ("c", 3.into())])
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        let a = Config::create(mapping(vec![
            ("a", 1.into()),
            ("b", mapping(vec![("c", vec![1, 2].into())])),
        ]))
        .unwrap();
        let once = merge(&a, &[&a]).unwrap();
        assert_eq!(once, a);
    }

    #[test]
    fn test_merge_overlays_flags() {
        let a = Config::create(mapping(vec![("a", 1.into())])).unwrap();
        let mut b = Config::create(mapping(vec![("b", 2.into())])).unwrap();
        b.set_struct(true);

        let merged = merge(&a, &[&b]).unwrap();
        assert_eq!(merged.flag(crate::node::Flag::Struct), Some(true));
        let err = merged.get("zzz").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownKey);
    }
}
