//! Borrowed views into a config tree
//!
//! `Container` reads a mapping or sequence, `ContainerMut` modifies one and
//! `NodeRef` exposes the metadata of any node. Reads resolve interpolations;
//! writes validate against readonly, struct mode and declared types before
//! touching the tree.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::Config;
use crate::error::{Error, ErrorKind, Result};
use crate::interpolation::ValueKind;
use crate::merge::{expand, merge_node};
use crate::node::{Content, Flag, NodeId, NodeKind};
use crate::resolve::{node_to_value, resolve_node, segment_key, split_path, Resolved};
use crate::schema::{StructSchema, StructValue};
use crate::tree::{ContentState, Tree};
use crate::types::{EnumValue, Key, TypeSpec};
use crate::value::Value;
use crate::wrap::{assign, convert_key, element_optional, element_type, wrap, Slot};

/// How enum members are written when a tree is dumped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumRepr {
    /// Keep `Value::Enum`
    #[default]
    Member,
    /// Member name, e.g. `RED`
    Name,
    /// Integer value of the member
    Value,
}

impl EnumRepr {
    pub(crate) fn apply(self, value: Value) -> Value {
        match (self, value) {
            (EnumRepr::Member, value) => value,
            (EnumRepr::Name, Value::Enum(e)) => Value::String(e.name().to_string()),
            (EnumRepr::Value, Value::Enum(e)) => Value::Integer(e.value()),
            (repr, Value::Sequence(items)) => {
                Value::Sequence(items.into_iter().map(|v| repr.apply(v)).collect())
            }
            (repr, Value::Mapping(map)) => {
                Value::Mapping(map.into_iter().map(|(k, v)| (k, repr.apply(v))).collect())
            }
            (_, value) => value,
        }
    }
}

/// Result of a read: a scalar or a nested container
#[derive(Debug, Clone)]
pub enum Item<'a> {
    Value(Value),
    Container(Container<'a>),
}

impl<'a> Item<'a> {
    pub(crate) fn from_resolved(cfg: &'a Config, resolved: Resolved) -> Self {
        match resolved {
            Resolved::Value(v) => Item::Value(v),
            Resolved::Node(id) => Item::Container(Container::new(cfg, id)),
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Item::Value(v) => Some(v),
            Item::Container(_) => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Item::Value(v) => Some(v),
            Item::Container(_) => None,
        }
    }

    pub fn as_container(&self) -> Option<Container<'a>> {
        match self {
            Item::Container(c) => Some(*c),
            Item::Value(_) => None,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Item::Container(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_value().and_then(Value::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_value().and_then(Value::as_bool)
    }

    pub fn as_enum(&self) -> Option<&EnumValue> {
        self.as_value().and_then(Value::as_enum)
    }

    /// Resolved primitive form of the item
    pub fn to_value(&self, enums: EnumRepr) -> Result<Value> {
        match self {
            Item::Value(v) => Ok(enums.apply(v.clone())),
            Item::Container(c) => c.to_value(true, enums),
        }
    }
}

impl PartialEq<Value> for Item<'_> {
    fn eq(&self, other: &Value) -> bool {
        match self {
            Item::Value(v) => v.loose_eq(other),
            Item::Container(c) => c == other,
        }
    }
}

/// Index into a sequence of `len` items; negative indices count from the end
pub(crate) fn seq_index(key: &Key, len: usize, path: &str) -> Result<usize> {
    let Key::Index(i) = key else {
        return Err(Error::key_validation(
            path,
            format!("Sequence indices must be integers, got '{}'", key),
        ));
    };
    let idx = if *i < 0 { *i + len as i64 } else { *i };
    if idx < 0 || idx >= len as i64 {
        return Err(Error::key_validation(
            path,
            format!("Index {} is out of range for a sequence of length {}", i, len),
        ));
    }
    Ok(idx as usize)
}

fn child_count(tree: &Tree, id: NodeId) -> usize {
    match &tree[id].kind {
        NodeKind::Map(m) => m.content.children().map(IndexMap::len).unwrap_or(0),
        NodeKind::Seq(s) => s.content.children().map(Vec::len).unwrap_or(0),
        NodeKind::Value(..) => 0,
    }
}

/// Validate `key` for the container `holder` and normalize it
fn normalize(tree: &Tree, holder: NodeId, key: Key) -> Result<Key> {
    let path = tree.full_key(holder);
    match &tree[holder].kind {
        NodeKind::Map(m) => convert_key(&m.key_type, key, &path),
        NodeKind::Seq(_) => {
            seq_index(&key, child_count(tree, holder), &path).map(|i| Key::Index(i as i64))
        }
        NodeKind::Value(..) => Err(Error::type_mismatch(path, "Not a container")),
    }
}

/// The container reads of `id` go to: `id` itself, or the container its
/// interpolation points at. `None` for a null container.
fn readable(cfg: &Config, id: NodeId) -> Result<Option<NodeId>> {
    match resolve_node(cfg, id)? {
        Resolved::Node(target) => Ok(Some(target)),
        Resolved::Value(Value::Null) => Ok(None),
        Resolved::Value(v) => Err(Error::type_mismatch(
            cfg.tree.full_key(id),
            format!("Expected a container, found {}", v.type_name()),
        )),
    }
}

/// Unresolved structural equality; key order is ignored and numbers compare
/// by value
pub(crate) fn nodes_equal(a: &Tree, ai: NodeId, b: &Tree, bi: NodeId) -> bool {
    match (a[ai].raw_scalar(), b[bi].raw_scalar()) {
        (Some(x), Some(y)) => x.loose_eq(&y),
        (None, None) => match (&a[ai].kind, &b[bi].kind) {
            (NodeKind::Map(x), NodeKind::Map(y)) => {
                match (x.content.children(), y.content.children()) {
                    (Some(xc), Some(yc)) => {
                        let by_name: HashMap<String, NodeId> =
                            yc.iter().map(|(k, id)| (k.to_key_string(), *id)).collect();
                        xc.len() == yc.len()
                            && xc.iter().all(|(k, xi)| {
                                by_name
                                    .get(&k.to_key_string())
                                    .is_some_and(|yi| nodes_equal(a, *xi, b, *yi))
                            })
                    }
                    _ => false,
                }
            }
            (NodeKind::Seq(x), NodeKind::Seq(y)) => {
                match (x.content.children(), y.content.children()) {
                    (Some(xc), Some(yc)) => {
                        xc.len() == yc.len()
                            && xc.iter().zip(yc).all(|(xi, yi)| nodes_equal(a, *xi, b, *yi))
                    }
                    _ => false,
                }
            }
            _ => false,
        },
        _ => false,
    }
}

/// Metadata of a single node
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    cfg: &'a Config,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    pub(crate) fn new(cfg: &'a Config, id: NodeId) -> Self {
        Self { cfg, id }
    }

    pub fn key(&self) -> Option<&'a Key> {
        self.cfg.tree[self.id].key.as_ref()
    }

    pub fn full_key(&self) -> String {
        self.cfg.tree.full_key(self.id)
    }

    /// The node holds `???`
    pub fn is_missing(&self) -> bool {
        self.raw().is_missing()
    }

    /// The node holds null
    pub fn is_none(&self) -> bool {
        self.raw().is_null()
    }

    pub fn is_interpolation(&self) -> bool {
        let data = &self.cfg.tree[self.id];
        match &data.kind {
            NodeKind::Map(m) => matches!(m.content, Content::Interpolation(_)),
            NodeKind::Seq(s) => matches!(s.content, Content::Interpolation(_)),
            NodeKind::Value(..) => matches!(
                data.kind_of_value(),
                ValueKind::Interpolation | ValueKind::StrInterpolation
            ),
        }
    }

    pub fn is_optional(&self) -> bool {
        self.cfg.tree[self.id].optional
    }

    pub fn is_container(&self) -> bool {
        self.cfg.tree[self.id].is_container()
    }

    pub fn value_kind(&self) -> ValueKind {
        self.cfg.tree[self.id].kind_of_value()
    }

    /// Schema the node is bound to, or declared with
    pub fn object_type(&self) -> Option<&'a Arc<StructSchema>> {
        self.cfg.tree[self.id].schema_type()
    }

    pub fn declared_type(&self) -> &'a TypeSpec {
        &self.cfg.tree[self.id].declared
    }

    /// Unresolved value of the subtree
    pub fn raw(&self) -> Value {
        self.cfg.tree.raw_value(self.id)
    }

    /// Effective flag value, inherited from ancestors
    pub fn flag(&self, flag: Flag) -> Option<bool> {
        self.cfg.tree.flag(self.id, flag)
    }

    /// Flag value set on this node only
    pub fn node_flag(&self, flag: Flag) -> Option<bool> {
        self.cfg.tree[self.id].flags.get(flag)
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("key", &self.full_key())
            .field("raw", &self.raw())
            .finish()
    }
}

/// Read access to a mapping or sequence
#[derive(Clone, Copy)]
pub struct Container<'a> {
    cfg: &'a Config,
    id: NodeId,
}

impl<'a> Container<'a> {
    pub(crate) fn new(cfg: &'a Config, id: NodeId) -> Self {
        Self { cfg, id }
    }

    fn tree(&self) -> &'a Tree {
        &self.cfg.tree
    }

    pub fn full_key(&self) -> String {
        self.tree().full_key(self.id)
    }

    pub fn is_map(&self) -> bool {
        matches!(self.tree()[self.id].kind, NodeKind::Map(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self.tree()[self.id].kind, NodeKind::Seq(_))
    }

    /// Metadata of the container itself
    pub fn node_ref(&self) -> NodeRef<'a> {
        NodeRef::new(self.cfg, self.id)
    }

    pub fn object_type(&self) -> Option<&'a Arc<StructSchema>> {
        self.node_ref().object_type()
    }

    pub fn flag(&self, flag: Flag) -> Option<bool> {
        self.tree().flag(self.id, flag)
    }

    pub fn node_flag(&self, flag: Flag) -> Option<bool> {
        self.node_ref().node_flag(flag)
    }

    fn child_id(&self, key: Key) -> Result<NodeId> {
        let tree = self.tree();
        let Some(holder) = readable(self.cfg, self.id)? else {
            return Err(Error::key_not_found(tree.child_key(self.id, &key)));
        };
        let key = normalize(tree, holder, key)?;
        match tree.child(holder, &key) {
            Some(child) => Ok(child),
            None if tree.admits_key(holder, &key) => {
                Err(Error::key_not_found(tree.child_key(holder, &key)))
            }
            None => Err(Error::unknown_key(tree.child_key(holder, &key), &key)),
        }
    }

    /// Read a child, resolving interpolations
    pub fn get(&self, key: impl Into<Key>) -> Result<Item<'a>> {
        let child = self.child_id(key.into())?;
        resolve_node(self.cfg, child).map(|r| Item::from_resolved(self.cfg, r))
    }

    /// Read a child; an absent key, null or `???` yields `default`
    pub fn get_or(&self, key: impl Into<Key>, default: impl Into<Value>) -> Result<Item<'a>> {
        match self.get(key) {
            Ok(Item::Value(Value::Null)) => Ok(Item::Value(default.into())),
            Err(e) if e.is_absent() => Ok(Item::Value(default.into())),
            other => other,
        }
    }

    /// Metadata of a child, without resolving it
    pub fn node(&self, key: impl Into<Key>) -> Result<NodeRef<'a>> {
        self.child_id(key.into()).map(|id| NodeRef::new(self.cfg, id))
    }

    /// True if the child exists and can be read. Never fails.
    ///
    /// A child whose interpolation names an unregistered resolver still
    /// counts as present; any other read failure counts as absent.
    pub fn contains(&self, key: impl Into<Key>) -> bool {
        match self.get(key) {
            Ok(_) => true,
            Err(e) => matches!(e.kind, ErrorKind::UnsupportedInterpolationType(_)),
        }
    }

    pub fn is_missing(&self, key: impl Into<Key>) -> bool {
        self.node(key).is_ok_and(|n| n.is_missing())
    }

    pub fn is_none(&self, key: impl Into<Key>) -> bool {
        self.node(key).is_ok_and(|n| n.is_none())
    }

    pub fn is_interpolation(&self, key: impl Into<Key>) -> bool {
        self.node(key).is_ok_and(|n| n.is_interpolation())
    }

    pub fn is_optional(&self, key: impl Into<Key>) -> bool {
        self.node(key).is_ok_and(|n| n.is_optional())
    }

    /// Keys in insertion order, or indices for a sequence
    pub fn keys(&self) -> Vec<Key> {
        let Ok(Some(holder)) = readable(self.cfg, self.id) else {
            return Vec::new();
        };
        match &self.tree()[holder].kind {
            NodeKind::Map(m) => m
                .content
                .children()
                .map(|c| c.keys().cloned().collect())
                .unwrap_or_default(),
            NodeKind::Seq(_) => (0..child_count(self.tree(), holder))
                .map(|i| Key::Index(i as i64))
                .collect(),
            NodeKind::Value(..) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        match readable(self.cfg, self.id) {
            Ok(Some(holder)) => child_count(self.tree(), holder),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a dotted path (`a.b`, `list.0`, `list[0]`) below this
    /// container; `None` if a segment does not exist
    pub fn select(&self, path: &str) -> Result<Option<Item<'a>>> {
        let mut current = Item::Container(*self);
        for segment in split_path(path) {
            let Item::Container(container) = current else {
                return Ok(None);
            };
            let step = readable(self.cfg, container.id).and_then(|holder| {
                let key = holder.and_then(|h| segment_key(self.cfg, h, &segment));
                match key {
                    Some(key) => container.get(key).map(Some),
                    None => Ok(None),
                }
            });
            current = match step {
                Ok(Some(item)) => item,
                Ok(None) => return Ok(None),
                Err(e) if e.is_absent() => return Ok(None),
                Err(e) => return Err(e),
            };
        }
        Ok(Some(current))
    }

    /// Dump to a primitive value; `???` stays as is
    pub fn to_value(&self, resolve: bool, enums: EnumRepr) -> Result<Value> {
        node_to_value(self.cfg, self.id, resolve, enums)
    }

    /// New untyped config holding the raw values of `keys` that exist here
    pub fn masked_copy(&self, keys: &[&str]) -> Result<Config> {
        let tree = self.tree();
        let mut content = IndexMap::new();
        if let Some(holder) = readable(self.cfg, self.id)? {
            for name in keys {
                let Ok(key) = normalize(tree, holder, Key::from(*name)) else {
                    continue;
                };
                if let Some(child) = tree.child(holder, &key) {
                    content.insert(key.to_key_string(), tree.raw_value(child));
                }
            }
        }
        Ok(Config::create(Value::Mapping(content))?.with_registry(self.cfg.resolvers.clone()))
    }
}

impl PartialEq for Container<'_> {
    fn eq(&self, other: &Self) -> bool {
        nodes_equal(self.tree(), self.id, other.tree(), other.id)
    }
}

impl PartialEq<Value> for Container<'_> {
    fn eq(&self, other: &Value) -> bool {
        Config::create(other.clone())
            .is_ok_and(|c| nodes_equal(self.tree(), self.id, &c.tree, c.root))
    }
}

impl fmt::Debug for Container<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("key", &self.full_key())
            .field("raw", &self.tree().raw_value(self.id))
            .finish()
    }
}

/// Write access to a mapping or sequence
pub struct ContainerMut<'a> {
    cfg: &'a mut Config,
    id: NodeId,
}

impl<'a> ContainerMut<'a> {
    pub(crate) fn new(cfg: &'a mut Config, id: NodeId) -> Self {
        Self { cfg, id }
    }

    pub fn as_container(&self) -> Container<'_> {
        Container::new(self.cfg, self.id)
    }

    pub fn get(&self, key: impl Into<Key>) -> Result<Item<'_>> {
        Container::new(self.cfg, self.id).get(key)
    }

    /// Write access to a child container
    pub fn child_mut(&mut self, key: impl Into<Key>) -> Result<ContainerMut<'_>> {
        let target = self.child_target(key.into())?;
        Ok(ContainerMut::new(&mut *self.cfg, target))
    }

    /// Like `child_mut`, consuming this view
    pub fn into_child(self, key: impl Into<Key>) -> Result<ContainerMut<'a>> {
        let target = self.child_target(key.into())?;
        Ok(ContainerMut::new(self.cfg, target))
    }

    /// Child container writes go to; an interpolated child is followed
    fn child_target(&self, key: Key) -> Result<NodeId> {
        let child = self.as_container().child_id(key)?;
        let tree = &self.cfg.tree;
        let data = &tree[child];
        let target = match &data.kind {
            NodeKind::Value(..) => match resolve_node(self.cfg, child)? {
                Resolved::Node(node) => node,
                Resolved::Value(_) => {
                    return Err(Error::type_mismatch(tree.full_key(child), "Not a container"))
                }
            },
            NodeKind::Map(m) if matches!(m.content, Content::Interpolation(_)) => {
                readable(self.cfg, child)?.unwrap_or(child)
            }
            NodeKind::Seq(s) if matches!(s.content, Content::Interpolation(_)) => {
                readable(self.cfg, child)?.unwrap_or(child)
            }
            _ => child,
        };
        Ok(target)
    }

    /// Make sure the container has children to write into
    fn writable(&mut self) -> Result<NodeId> {
        let tree = &mut self.cfg.tree;
        if child_count_or_none(tree, self.id).is_none() {
            if tree.is_readonly(self.id) {
                return Err(Error::readonly(tree.full_key(self.id)));
            }
            expand(tree, self.id)?;
        }
        Ok(self.id)
    }

    /// Assign a child; see the crate docs for the validation rules
    pub fn set(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let holder = self.writable()?;
        let tree = &mut self.cfg.tree;
        let key = normalize(tree, holder, key.into())?;
        log::trace!("set '{}'", tree.child_key(holder, &key));
        assign(tree, holder, key, value.into())
    }

    /// Assign through a dotted path, creating intermediate mappings
    pub fn update(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let segments = split_path(path);
        let Some((last, parents)) = segments.split_last() else {
            return Err(Error::key_validation(
                self.as_container().full_key(),
                "Cannot update an empty path",
            ));
        };

        let mut current = self.id;
        for segment in parents {
            let key = segment_to_key(&self.cfg.tree, current, segment)?;
            let mut parent = ContainerMut::new(&mut *self.cfg, current);
            let holder = parent.writable()?;
            let key = normalize(&parent.cfg.tree, holder, key)?;
            let existing = parent
                .cfg
                .tree
                .child(holder, &key)
                .filter(|c| !parent.cfg.tree[*c].raw_scalar().is_some_and(|v| v.is_null()));
            let child = match existing {
                Some(child) => child,
                None => {
                    parent.set(key.clone(), Value::Mapping(IndexMap::new()))?;
                    parent.cfg.tree.child(holder, &key).ok_or_else(|| {
                        Error::internal(format!("'{}' vanished after assignment", segment))
                    })?
                }
            };
            if !self.cfg.tree[child].is_container() {
                return Err(Error::validation(
                    self.cfg.tree.full_key(child),
                    format!("Cannot update '{}' through a value", path),
                ));
            }
            current = child;
        }

        let key = segment_to_key(&self.cfg.tree, current, last)?;
        ContainerMut::new(&mut *self.cfg, current).set(key, value)
    }

    fn check_pop(&self) -> Result<()> {
        let tree = &self.cfg.tree;
        let path = tree.full_key(self.id);
        if tree.is_readonly(self.id) {
            return Err(Error::readonly(path));
        }
        let data = &tree[self.id];
        if !matches!(data.kind, NodeKind::Map(_)) {
            return Err(Error::type_mismatch(path, "pop() works on mappings, use pop_index()"));
        }
        let typed = data.schema_type().is_some() && data.flags.get(Flag::Struct) != Some(false);
        if typed || tree.flag(self.id, Flag::Struct) == Some(true) {
            return Err(Error::type_mismatch(
                path,
                "Typed or struct-mode mappings do not support pop",
            ));
        }
        Ok(())
    }

    fn take(&mut self, child: NodeId, default: Option<Value>) -> Result<Value> {
        let path = self.cfg.tree.full_key(child);
        let value = match node_to_value(self.cfg, child, true, EnumRepr::Member) {
            Ok(v) if v.is_missing() => {
                default.ok_or_else(|| Error::missing_mandatory_value(path))?
            }
            Ok(v) => v,
            Err(e) if e.is_absent() => default.ok_or(e)?,
            Err(e) => return Err(e),
        };
        self.cfg.tree.detach(self.id, child);
        Ok(value)
    }

    fn pop_key(&mut self, key: Key, default: Option<Value>) -> Result<Value> {
        self.check_pop()?;
        let tree = &self.cfg.tree;
        let key = normalize(tree, self.id, key)?;
        match tree.child(self.id, &key) {
            Some(child) => self.take(child, default),
            None => default.ok_or_else(|| Error::key_not_found(tree.child_key(self.id, &key))),
        }
    }

    /// Remove a key of a mapping and return its resolved value
    pub fn pop(&mut self, key: impl Into<Key>) -> Result<Value> {
        self.pop_key(key.into(), None)
    }

    /// Like `pop`, but an absent or `???` value yields `default`
    pub fn pop_or(&mut self, key: impl Into<Key>, default: impl Into<Value>) -> Result<Value> {
        self.pop_key(key.into(), Some(default.into()))
    }

    fn writable_seq(&mut self) -> Result<NodeId> {
        let tree = &self.cfg.tree;
        if !matches!(tree[self.id].kind, NodeKind::Seq(_)) {
            return Err(Error::type_mismatch(tree.full_key(self.id), "Not a sequence"));
        }
        if tree.is_readonly(self.id) {
            return Err(Error::readonly(tree.full_key(self.id)));
        }
        self.writable()
    }

    fn wrap_item(&mut self, index: usize, value: Value) -> Result<NodeId> {
        let tree = &mut self.cfg.tree;
        let element = element_type(tree, self.id);
        let optional = element_optional(&element);
        wrap(
            tree,
            value,
            Slot::child(self.id, Key::Index(index as i64), element, optional),
        )
    }

    pub fn append(&mut self, value: impl Into<Value>) -> Result<()> {
        let id = self.writable_seq()?;
        let len = child_count(&self.cfg.tree, id);
        let child = self.wrap_item(len, value.into())?;
        self.cfg.tree.attach(id, Key::Index(len as i64), child);
        Ok(())
    }

    /// Insert before `index`; negative indices count from the end
    pub fn insert(&mut self, index: i64, value: impl Into<Value>) -> Result<()> {
        let id = self.writable_seq()?;
        let len = child_count(&self.cfg.tree, id) as i64;
        let at = if index < 0 { index + len } else { index };
        if !(0..=len).contains(&at) {
            return Err(Error::key_validation(
                self.cfg.tree.full_key(id),
                format!("Index {} is out of range for a sequence of length {}", index, len),
            ));
        }
        let child = self.wrap_item(at as usize, value.into())?;
        self.cfg.tree.insert_at(id, at as usize, child);
        Ok(())
    }

    /// Remove an item of a sequence and return its resolved value
    pub fn pop_index(&mut self, index: i64) -> Result<Value> {
        let id = self.writable_seq()?;
        let tree = &self.cfg.tree;
        let idx = seq_index(&Key::Index(index), child_count(tree, id), &tree.full_key(id))?;
        let child = tree
            .child(id, &Key::Index(idx as i64))
            .ok_or_else(|| Error::internal(format!("no item at index {}", idx)))?;
        self.take(child, None)
    }

    /// Remove every child
    pub fn clear(&mut self) -> Result<()> {
        let tree = &mut self.cfg.tree;
        if tree.is_readonly(self.id) {
            return Err(Error::readonly(tree.full_key(self.id)));
        }
        tree.reset_content(self.id, ContentState::Empty);
        Ok(())
    }

    /// Merge `other` into this container
    pub fn merge_with(&mut self, other: &Config) -> Result<()> {
        self.merge_with_all(&[other])
    }

    /// Merge several configs left to right; nothing changes if any fails
    pub fn merge_with_all(&mut self, others: &[&Config]) -> Result<()> {
        let mut tree = self.cfg.tree.clone();
        for other in others {
            if other.tree[other.root].raw_scalar().is_some_and(|v| v.is_null()) {
                return Err(Error::value("cannot merge with a null config")
                    .with_help("Create the override from a mapping or a sequence"));
            }
            merge_node(&mut tree, self.id, &other.tree, other.root)?;
        }
        self.cfg.tree = tree;
        log::debug!(
            "merged {} config(s) into '{}'",
            others.len(),
            self.cfg.tree.full_key(self.id)
        );
        Ok(())
    }

    /// Retype an untyped mapping as `schema`. The schema's prototype is merged
    /// into the mapping, so schema values override existing ones while keys
    /// the schema does not name are kept.
    pub fn promote(&mut self, schema: &Arc<StructSchema>) -> Result<()> {
        let id = self.id;
        let path = self.cfg.tree.full_key(id);
        if !matches!(self.cfg.tree[id].kind, NodeKind::Map(_)) {
            return Err(Error::type_mismatch(path, "Only mappings can be promoted")
                .with_help("Call promote on a mapping node"));
        }
        if self.cfg.tree.is_readonly(id) {
            return Err(Error::readonly(path));
        }

        let mut proto = Tree::default();
        let root = wrap(
            &mut proto,
            Value::Struct(StructValue::new(schema)),
            Slot::root(TypeSpec::Any),
        )?;
        if let NodeKind::Map(m) = &mut proto[root].kind {
            m.object_type = None;
        }

        let mut tree = self.cfg.tree.clone();
        merge_node(&mut tree, id, &proto, root).map_err(|e| e.or_path(path.clone()))?;
        if let NodeKind::Map(m) = &mut tree[id].kind {
            m.object_type = Some(Arc::clone(schema));
        }
        if schema.is_frozen() {
            tree[id].flags.set(Flag::Readonly, Some(true));
        }
        self.cfg.tree = tree;
        log::debug!("promoted '{}' to {}", path, schema.name());
        Ok(())
    }

    /// Set a flag on this container; `None` inherits from the parent again
    pub fn set_flag(&mut self, flag: Flag, value: Option<bool>) {
        self.cfg.tree[self.id].flags.set(flag, value);
    }

    /// Set a flag on a direct child, container or value
    pub fn set_node_flag(&mut self, key: impl Into<Key>, flag: Flag, value: Option<bool>) -> Result<()> {
        let child = self.as_container().child_id(key.into())?;
        self.cfg.tree[child].flags.set(flag, value);
        Ok(())
    }

    pub fn set_readonly(&mut self, readonly: bool) {
        self.set_flag(Flag::Readonly, Some(readonly));
    }

    pub fn set_struct(&mut self, struct_mode: bool) {
        self.set_flag(Flag::Struct, Some(struct_mode));
    }

    fn scoped<R>(&mut self, flag: Flag, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.cfg.tree[self.id].flags.get(flag);
        self.set_flag(flag, Some(false));
        let out = f(self);
        self.set_flag(flag, previous);
        out
    }

    /// Run `f` with struct mode switched off on this container
    pub fn open_dict<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.scoped(Flag::Struct, f)
    }

    /// Run `f` with readonly switched off on this container
    pub fn read_write<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.scoped(Flag::Readonly, f)
    }
}

fn child_count_or_none(tree: &Tree, id: NodeId) -> Option<usize> {
    match &tree[id].kind {
        NodeKind::Map(m) => m.content.children().map(IndexMap::len),
        NodeKind::Seq(s) => s.content.children().map(Vec::len),
        NodeKind::Value(..) => Some(0),
    }
}

/// Key a dotted-path segment names in the container `id`
fn segment_to_key(tree: &Tree, id: NodeId, segment: &str) -> Result<Key> {
    match &tree[id].kind {
        NodeKind::Seq(_) => segment.parse::<i64>().map(Key::Index).map_err(|_| {
            Error::key_validation(
                tree.full_key(id),
                format!("'{}' is not a sequence index", segment),
            )
        }),
        _ => Ok(Key::Str(segment.to_string())),
    }
}
