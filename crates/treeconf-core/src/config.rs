//! The `Config` handle and the top-level merge functions

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use crate::container::{nodes_equal, Container, ContainerMut, EnumRepr, Item, NodeRef};
use crate::error::{Error, Result};
use crate::node::{Flag, NodeId};
use crate::resolver::{ResolverCache, ResolverRegistry};
use crate::schema::{StructSchema, StructValue, Structured};
use crate::tree::Tree;
use crate::types::{Key, KeyType, TypeSpec};
use crate::value::Value;
use crate::wrap::{wrap, Slot};

/// A configuration tree.
///
/// Owns every node, the resolver cache and an optional private resolver
/// registry. Cloning is a deep copy; the clone starts with a copy of the
/// cache.
///
/// # Example
///
/// ```rust
/// use treeconf_core::{Config, Value};
///
/// let cfg = Config::create(Value::from_iter([
///     ("host", Value::from("localhost")),
///     ("url", Value::from("http://${host}:8080")),
/// ])).unwrap();
///
/// assert_eq!(cfg.get("url").unwrap(), Value::from("http://localhost:8080"));
/// ```
#[derive(Clone)]
pub struct Config {
    pub(crate) tree: Tree,
    pub(crate) root: NodeId,
    pub(crate) cache: RefCell<ResolverCache>,
    pub(crate) resolvers: Option<Arc<ResolverRegistry>>,
}

impl Config {
    fn from_tree(tree: Tree, root: NodeId) -> Self {
        Self {
            tree,
            root,
            cache: RefCell::new(ResolverCache::new()),
            resolvers: None,
        }
    }

    /// Build a config from a mapping, a sequence or a structured value.
    ///
    /// Null and `???` give an untyped mapping in that state. Any other
    /// scalar is rejected.
    pub fn create(value: impl Into<Value>) -> Result<Self> {
        let value = value.into();
        let declared = match &value {
            Value::Mapping(_) | Value::Sequence(_) | Value::Struct(_) => TypeSpec::Any,
            Value::Null => TypeSpec::dict(KeyType::Any, TypeSpec::Any),
            v if v.is_missing() => TypeSpec::dict(KeyType::Any, TypeSpec::Any),
            other => return Err(Error::unsupported_value_type("", other.type_name())),
        };
        let mut tree = Tree::default();
        let root = wrap(&mut tree, value, Slot::root(declared))?;
        log::trace!("created config with {} root", root_kind(&tree, root));
        Ok(Self::from_tree(tree, root))
    }

    /// An empty, untyped mapping
    pub fn empty() -> Self {
        let mut tree = Tree::default();
        let root = tree.insert(crate::node::NodeData {
            key: None,
            parent: None,
            flags: Default::default(),
            optional: true,
            declared: TypeSpec::Any,
            kind: crate::node::NodeKind::Map(crate::node::MapNode {
                content: crate::node::Content::Children(Default::default()),
                object_type: None,
                key_type: KeyType::Any,
                element_type: TypeSpec::Any,
            }),
        });
        Self::from_tree(tree, root)
    }

    /// Typed config bound from a structured value
    pub fn structured(value: &StructValue) -> Result<Self> {
        Self::create(Value::Struct(value.clone()))
    }

    /// Typed config bound from a host type
    pub fn from_structured<T: Structured>(value: &T) -> Result<Self> {
        Self::structured(&value.to_struct_value())
    }

    /// Resolve interpolations with `registry` instead of the global one
    pub fn with_resolvers(self, registry: Arc<ResolverRegistry>) -> Self {
        self.with_registry(Some(registry))
    }

    pub(crate) fn with_registry(mut self, registry: Option<Arc<ResolverRegistry>>) -> Self {
        self.resolvers = registry;
        self
    }

    pub fn root(&self) -> Container<'_> {
        Container::new(self, self.root)
    }

    pub fn root_mut(&mut self) -> ContainerMut<'_> {
        let root = self.root;
        ContainerMut::new(self, root)
    }

    pub fn get(&self, key: impl Into<Key>) -> Result<Item<'_>> {
        self.root().get(key)
    }

    pub fn get_or(&self, key: impl Into<Key>, default: impl Into<Value>) -> Result<Item<'_>> {
        self.root().get_or(key, default)
    }

    pub fn select(&self, path: &str) -> Result<Option<Item<'_>>> {
        self.root().select(path)
    }

    pub fn node(&self, key: impl Into<Key>) -> Result<NodeRef<'_>> {
        self.root().node(key)
    }

    pub fn contains(&self, key: impl Into<Key>) -> bool {
        self.root().contains(key)
    }

    pub fn is_missing(&self, key: impl Into<Key>) -> bool {
        self.root().is_missing(key)
    }

    pub fn keys(&self) -> Vec<Key> {
        self.root().keys()
    }

    pub fn len(&self) -> usize {
        self.root().len()
    }

    pub fn is_empty(&self) -> bool {
        self.root().is_empty()
    }

    /// Dump to primitive values, optionally resolving interpolations
    pub fn to_value(&self, resolve: bool, enums: EnumRepr) -> Result<Value> {
        self.root().to_value(resolve, enums)
    }

    pub fn masked_copy(&self, keys: &[&str]) -> Result<Config> {
        self.root().masked_copy(keys)
    }

    pub fn set(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        self.root_mut().set(key, value)
    }

    pub fn update(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        self.root_mut().update(path, value)
    }

    pub fn pop(&mut self, key: impl Into<Key>) -> Result<Value> {
        self.root_mut().pop(key)
    }

    pub fn pop_or(&mut self, key: impl Into<Key>, default: impl Into<Value>) -> Result<Value> {
        self.root_mut().pop_or(key, default)
    }

    pub fn child_mut(&mut self, key: impl Into<Key>) -> Result<ContainerMut<'_>> {
        self.root_mut().into_child(key)
    }

    pub fn merge_with(&mut self, other: &Config) -> Result<()> {
        self.root_mut().merge_with(other)
    }

    pub fn merge_with_all(&mut self, others: &[&Config]) -> Result<()> {
        self.root_mut().merge_with_all(others)
    }

    pub fn promote(&mut self, schema: &Arc<StructSchema>) -> Result<()> {
        self.root_mut().promote(schema)
    }

    /// Effective flag of the root
    pub fn flag(&self, flag: Flag) -> Option<bool> {
        self.root().flag(flag)
    }

    pub fn set_flag(&mut self, flag: Flag, value: Option<bool>) {
        self.root_mut().set_flag(flag, value);
    }

    pub fn set_readonly(&mut self, readonly: bool) {
        self.root_mut().set_readonly(readonly);
    }

    pub fn set_struct(&mut self, struct_mode: bool) {
        self.root_mut().set_struct(struct_mode);
    }

    /// Run `f` with struct mode off on the root, restoring it afterwards
    pub fn open_dict<R>(&mut self, f: impl FnOnce(&mut ContainerMut<'_>) -> R) -> R {
        self.root_mut().open_dict(f)
    }

    /// Run `f` with readonly off on the root, restoring it afterwards
    pub fn read_write<R>(&mut self, f: impl FnOnce(&mut ContainerMut<'_>) -> R) -> R {
        self.root_mut().read_write(f)
    }

    /// Snapshot of the resolver cache
    pub fn resolver_cache(&self) -> ResolverCache {
        self.cache.borrow().clone()
    }

    pub fn set_resolver_cache(&mut self, cache: ResolverCache) {
        self.cache = RefCell::new(cache);
    }

    /// Replace this config's cache with a copy of `other`'s
    pub fn copy_resolver_cache(&mut self, other: &Config) {
        self.set_resolver_cache(other.resolver_cache());
    }

    pub fn clear_resolver_cache(&mut self) {
        self.cache.get_mut().clear();
    }
}

fn root_kind(tree: &Tree, root: NodeId) -> &'static str {
    match &tree[root].kind {
        crate::node::NodeKind::Seq(_) => "sequence",
        _ if tree[root].object_type().is_some() => "typed mapping",
        _ => "mapping",
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tree.raw_value(self.root))
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("content", &self.tree.raw_value(self.root))
            .field("cached", &self.cache.borrow().len())
            .field(
                "resolvers",
                &self.resolvers.as_ref().map(|r| r.names()),
            )
            .finish()
    }
}

impl PartialEq for Config {
    fn eq(&self, other: &Self) -> bool {
        nodes_equal(&self.tree, self.root, &other.tree, other.root)
    }
}

impl PartialEq<Value> for Config {
    fn eq(&self, other: &Value) -> bool {
        self.root() == *other
    }
}

/// Merge `overrides` onto a copy of `base`, left to right.
///
/// The result is a deep copy of `base`, so it shares its resolver registry
/// and starts with a copy of its cache. Inputs are never modified.
pub fn merge(base: &Config, overrides: &[&Config]) -> Result<Config> {
    let mut out = base.clone();
    out.merge_with_all(overrides)?;
    Ok(out)
}

/// Create a config from each value and merge them left to right
pub fn merge_values(values: &[Value]) -> Result<Config> {
    let configs = values
        .iter()
        .map(|v| Config::create(v.clone()))
        .collect::<Result<Vec<_>>>()?;
    let Some((first, rest)) = configs.split_first() else {
        return Ok(Config::empty());
    };
    let rest: Vec<&Config> = rest.iter().collect();
    merge(first, &rest)
}
