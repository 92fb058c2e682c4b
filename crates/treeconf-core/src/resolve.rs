//! Interpolation resolution
//!
//! Values are resolved lazily on read. A node holding `${...}` is resolved
//! against the tree it lives in: references walk the tree from the root (or
//! from the holder for relative references), resolver calls go through the
//! config's resolver cache. Chains of references are followed until a
//! concrete value or container is reached.

use crate::config::Config;
use crate::container::EnumRepr;
use crate::error::{Error, Result};
use crate::interpolation::{parse, tokenize_args, value_kind, Interpolation, ValueKind};
use crate::node::{Content, NodeId, NodeKind, ValueType};
use crate::resolver::get_resolver;
use crate::types::{EnumType, Key, KeyType};
use crate::value::Value;

/// Outcome of resolving a node: a scalar, or the container it stands for
#[derive(Debug, Clone)]
pub(crate) enum Resolved {
    Value(Value),
    Node(NodeId),
}

/// Resolve the node `id` of `cfg`
pub(crate) fn resolve_node(cfg: &Config, id: NodeId) -> Result<Resolved> {
    Engine::new(cfg).node(id)
}

/// Dump the subtree at `id` to a primitive value
pub(crate) fn node_to_value(
    cfg: &Config,
    id: NodeId,
    resolve: bool,
    enums: EnumRepr,
) -> Result<Value> {
    let mut engine = Engine::new(cfg);
    if resolve {
        engine.dump(id, enums)
    } else {
        Ok(engine.dump_raw(id, enums))
    }
}

/// Split a dotted path into segments; `a.b[0].c` gives `a`, `b`, `0`, `c`
pub(crate) fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .flat_map(|part| {
            part.split(['[', ']'])
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Key for `segment` inside the container `id`, if it can name a child
pub(crate) fn segment_key(cfg: &Config, id: NodeId, segment: &str) -> Option<Key> {
    match &cfg.tree[id].kind {
        NodeKind::Map(m) => match &m.key_type {
            KeyType::Enum(ty) => {
                EnumType::lookup(ty, &Value::String(segment.to_string())).map(Key::Enum)
            }
            _ => Some(Key::Str(segment.to_string())),
        },
        NodeKind::Seq(s) => {
            let len = s.content.children().map(Vec::len).unwrap_or(0) as i64;
            let idx = segment.parse::<i64>().ok()?;
            let idx = if idx < 0 { idx + len } else { idx };
            (0..len).contains(&idx).then_some(Key::Index(idx))
        }
        NodeKind::Value(..) => None,
    }
}

struct Engine<'a> {
    cfg: &'a Config,
    /// Nodes whose interpolation is being resolved, outermost first
    stack: Vec<NodeId>,
}

impl<'a> Engine<'a> {
    fn new(cfg: &'a Config) -> Self {
        Self {
            cfg,
            stack: Vec::new(),
        }
    }

    fn node(&mut self, id: NodeId) -> Result<Resolved> {
        let cfg = self.cfg;
        let tree = &cfg.tree;
        let data = &tree[id];
        match &data.kind {
            NodeKind::Value(ty, value) => match value_kind(value) {
                ValueKind::Value => Ok(Resolved::Value(value.clone())),
                ValueKind::MandatoryMissing => Err(Error::missing_mandatory_value(tree.full_key(id))),
                ValueKind::Interpolation | ValueKind::StrInterpolation => {
                    let text = value.as_str().unwrap_or_default().to_string();
                    let resolved = self.interpolate(id, &text)?;
                    match (ty, resolved) {
                        (ValueType::Any, resolved) | (_, resolved @ Resolved::Node(_)) => Ok(resolved),
                        (ty, Resolved::Value(v)) => ty
                            .coerce(v, data.optional)
                            .map(Resolved::Value)
                            .map_err(|e| e.or_path(tree.full_key(id))),
                    }
                }
            },
            NodeKind::Map(m) => self.container(id, content_of(&m.content)),
            NodeKind::Seq(s) => self.container(id, content_of(&s.content)),
        }
    }

    fn container(&mut self, id: NodeId, content: Content<()>) -> Result<Resolved> {
        match content {
            Content::Children(()) => Ok(Resolved::Node(id)),
            Content::Null => Ok(Resolved::Value(Value::Null)),
            Content::Missing => Err(Error::missing_mandatory_value(self.cfg.tree.full_key(id))),
            Content::Interpolation(text) => self.interpolate(id, &text),
        }
    }

    fn interpolate(&mut self, holder: NodeId, text: &str) -> Result<Resolved> {
        let cfg = self.cfg;
        let tree = &cfg.tree;
        if self.stack.contains(&holder) {
            let mut chain: Vec<String> = self.stack.iter().map(|id| tree.full_key(*id)).collect();
            chain.push(tree.full_key(holder));
            return Err(Error::circular_reference(tree.full_key(holder), chain));
        }

        self.stack.push(holder);
        let out = match parse(text) {
            Interpolation::Concat(parts) => self.concat(holder, parts).map(Resolved::Value),
            part => self.part(holder, part),
        };
        self.stack.pop();
        out
    }

    fn part(&mut self, holder: NodeId, part: Interpolation) -> Result<Resolved> {
        match part {
            Interpolation::Literal(s) => Ok(Resolved::Value(Value::String(s))),
            Interpolation::SelfRef { path, up } => self.reference(holder, &path, up),
            Interpolation::Resolver { name, args } => {
                self.call(holder, &name, &args).map(Resolved::Value)
            }
            Interpolation::Concat(parts) => self.concat(holder, parts).map(Resolved::Value),
        }
    }

    fn concat(&mut self, holder: NodeId, parts: Vec<Interpolation>) -> Result<Value> {
        let mut out = String::new();
        for part in parts {
            match self.part(holder, part)? {
                Resolved::Value(v) => out.push_str(&v.to_string()),
                Resolved::Node(id) => out.push_str(&self.dump(id, EnumRepr::Member)?.to_string()),
            }
        }
        Ok(Value::String(out))
    }

    fn reference(&mut self, holder: NodeId, path: &str, up: usize) -> Result<Resolved> {
        let cfg = self.cfg;
        let tree = &cfg.tree;
        let full = format!("{}{}", ".".repeat(up), path);
        let not_found = || Error::reference_not_found(full.clone(), tree.full_key(holder));

        let mut current = cfg.root;
        if up > 0 {
            current = tree[holder].parent.ok_or_else(not_found)?;
            for _ in 1..up {
                current = tree[current].parent.ok_or_else(not_found)?;
            }
        }

        for segment in split_path(path) {
            let container = match self.node(current)? {
                Resolved::Node(id) => id,
                Resolved::Value(_) => return Err(not_found()),
            };
            current = segment_key(cfg, container, &segment)
                .and_then(|key| tree.child(container, &key))
                .ok_or_else(not_found)?;
        }
        log::trace!("'{}' references '{}'", tree.full_key(holder), full);
        self.node(current)
    }

    fn call(&mut self, holder: NodeId, name: &str, args: &str) -> Result<Value> {
        let cfg = self.cfg;
        let path = cfg.tree.full_key(holder);
        if let Some(cached) = cfg.cache.borrow().get(name, args) {
            log::trace!("resolver cache hit for {}:{}", name, args);
            return Ok(cached.clone());
        }

        let resolver = match &cfg.resolvers {
            Some(registry) => registry.get(name),
            None => get_resolver(name),
        }
        .ok_or_else(|| Error::unsupported_interpolation_type(name, path.clone()))?;

        let value = resolver
            .resolve(&tokenize_args(args))
            .map_err(|e| e.or_path(path))?;
        log::debug!("resolved {}:{}", name, args);
        Ok(cfg
            .cache
            .borrow_mut()
            .insert_if_absent(name, args, value)
            .clone())
    }

    fn dump(&mut self, id: NodeId, enums: EnumRepr) -> Result<Value> {
        let cfg = self.cfg;
        let tree = &cfg.tree;
        if tree[id].kind_of_value() == ValueKind::MandatoryMissing
            && tree[id].raw_scalar().is_some_and(|v| v.is_missing())
        {
            return Ok(Value::missing());
        }

        match self.node(id)? {
            Resolved::Value(v) => Ok(enums.apply(v)),
            Resolved::Node(target) => match &tree[target].kind {
                NodeKind::Map(m) => {
                    let mut out = indexmap::IndexMap::new();
                    for (key, child) in m.content.children().into_iter().flatten() {
                        out.insert(key.to_key_string(), self.dump(*child, enums)?);
                    }
                    Ok(Value::Mapping(out))
                }
                NodeKind::Seq(s) => {
                    let mut out = Vec::new();
                    for child in s.content.children().into_iter().flatten() {
                        out.push(self.dump(*child, enums)?);
                    }
                    Ok(Value::Sequence(out))
                }
                NodeKind::Value(_, v) => Ok(enums.apply(v.clone())),
            },
        }
    }

    fn dump_raw(&self, id: NodeId, enums: EnumRepr) -> Value {
        enums.apply(self.cfg.tree.raw_value(id))
    }
}

fn content_of<T>(content: &Content<T>) -> Content<()> {
    match content {
        Content::Children(_) => Content::Children(()),
        Content::Missing => Content::Missing,
        Content::Interpolation(s) => Content::Interpolation(s.clone()),
        Content::Null => Content::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::resolver::{register_resolver, ResolverRegistry};
    use crate::schema::{Field, StructSchema, StructValue};
    use crate::types::TypeSpec;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn mapping(pairs: Vec<(&str, Value)>) -> Value {
        pairs.into_iter().collect()
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("a.b"), vec!["a", "b"]);
        assert_eq!(split_path("servers[0].host"), vec!["servers", "0", "host"]);
        assert_eq!(split_path("a.0"), vec!["a", "0"]);
        assert_eq!(split_path(""), Vec::<String>::new());
    }

    #[test]
    fn test_absolute_reference() {
        let cfg = Config::create(mapping(vec![
            ("database", mapping(vec![("host", "localhost".into()), ("port", 5432.into())])),
            ("url", "${database.host}".into()),
            ("port", "${database.port}".into()),
        ]))
        .unwrap();

        assert_eq!(cfg.get("url").unwrap(), Value::from("localhost"));
        assert_eq!(cfg.get("port").unwrap(), Value::Integer(5432));
    }

    #[test]
    fn test_relative_reference() {
        let cfg = Config::create(mapping(vec![
            ("name", "root".into()),
            (
                "server",
                mapping(vec![
                    ("host", "example.com".into()),
                    ("url", "${.host}".into()),
                    ("owner", "${..name}".into()),
                ]),
            ),
        ]))
        .unwrap();

        assert_eq!(cfg.select("server.url").unwrap().unwrap(), Value::from("example.com"));
        assert_eq!(cfg.select("server.owner").unwrap().unwrap(), Value::from("root"));
    }

    #[test]
    fn test_string_interpolation() {
        let cfg = Config::create(mapping(vec![
            ("host", "localhost".into()),
            ("port", 8080.into()),
            ("url", "http://${host}:${port}/".into()),
        ]))
        .unwrap();

        assert_eq!(cfg.get("url").unwrap(), Value::from("http://localhost:8080/"));
    }

    #[test]
    fn test_string_interpolation_renders_floats() {
        let cfg = Config::create(mapping(vec![
            ("version", Value::Float(1.0)),
            ("ratio", Value::Float(0.5)),
            ("label", "v${version} at ${ratio}".into()),
        ]))
        .unwrap();

        assert_eq!(cfg.get("label").unwrap(), Value::from("v1.0 at 0.5"));
    }

    #[test]
    fn test_chained_and_container_references() {
        let cfg = Config::create(mapping(vec![
            ("a", "${b}".into()),
            ("b", "${c}".into()),
            ("c", mapping(vec![("x", 1.into())])),
            ("list", vec![10, 20].into()),
            ("second", "${list.1}".into()),
            ("last", "${list.-1}".into()),
        ]))
        .unwrap();

        let a = cfg.get("a").unwrap();
        assert_eq!(a, mapping(vec![("x", 1.into())]));
        assert_eq!(cfg.select("a.x").unwrap().unwrap(), Value::Integer(1));
        assert_eq!(cfg.get("second").unwrap(), Value::Integer(20));
        assert_eq!(cfg.get("last").unwrap(), Value::Integer(20));
    }

    #[test]
    fn test_circular_reference() {
        let cfg = Config::create(mapping(vec![("a", "${b}".into()), ("b", "${a}".into())])).unwrap();

        let err = cfg.get("a").unwrap_err();
        assert_eq!(err.kind, ErrorKind::CircularReference);
        assert!(err.to_string().contains("a -> b -> a"));
    }

    #[test]
    fn test_reference_not_found() {
        let cfg = Config::create(mapping(vec![("a", "${nope.x}".into())])).unwrap();

        let err = cfg.get("a").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ReferenceNotFound("nope.x".into()));
        assert_eq!(err.path.as_deref(), Some("a"));
    }

    #[test]
    fn test_reference_to_missing() {
        let cfg = Config::create(mapping(vec![("a", "${b}".into()), ("b", "???".into())])).unwrap();

        let err = cfg.get("a").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingMandatoryValue);
        assert_eq!(err.path.as_deref(), Some("b"));
    }

    #[test]
    fn test_unknown_resolver() {
        let cfg = Config::create(mapping(vec![("a", "${nosuchresolver:x}".into())])).unwrap();

        let err = cfg.get("a").unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::UnsupportedInterpolationType("nosuchresolver".into())
        );
    }

    #[test]
    fn test_env_resolver_through_config() {
        std::env::set_var("TREECONF_RESOLVE_PORT", "9000");
        let cfg = Config::create(mapping(vec![
            ("port", "${env:TREECONF_RESOLVE_PORT}".into()),
            ("fallback", "${env:TREECONF_RESOLVE_UNSET, 42}".into()),
        ]))
        .unwrap();

        assert_eq!(cfg.get("port").unwrap(), Value::Integer(9000));
        assert_eq!(cfg.get("fallback").unwrap(), Value::Integer(42));
        std::env::remove_var("TREECONF_RESOLVE_PORT");
    }

    #[test]
    fn test_resolver_called_once_per_config() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        register_resolver("resolve_test_counter", |_| {
            Ok(Value::Integer(CALLS.fetch_add(1, Ordering::SeqCst) as i64))
        })
        .unwrap();

        let cfg = Config::create(mapping(vec![
            ("a", "${resolve_test_counter:x}".into()),
            ("b", "${resolve_test_counter:x}".into()),
            ("c", "${resolve_test_counter:y}".into()),
        ]))
        .unwrap();

        let a = cfg.get("a").unwrap();
        assert_eq!(cfg.get("b").unwrap(), a.as_value().cloned().unwrap());
        assert_ne!(cfg.get("c").unwrap(), a.as_value().cloned().unwrap());
        assert_eq!(cfg.resolver_cache().len(), 2);

        let copy = cfg.clone();
        assert_eq!(copy.get("a").unwrap(), a.as_value().cloned().unwrap());

        let mut fresh = Config::create(mapping(vec![("a", "${resolve_test_counter:x}".into())])).unwrap();
        fresh.copy_resolver_cache(&cfg);
        assert_eq!(fresh.get("a").unwrap(), a.as_value().cloned().unwrap());

        fresh.clear_resolver_cache();
        assert_ne!(fresh.get("a").unwrap(), a.as_value().cloned().unwrap());
    }

    #[test]
    fn test_private_registry() {
        let mut registry = ResolverRegistry::with_builtins();
        registry
            .register_fn("upper", |args| Ok(Value::String(args.join(",").to_uppercase())))
            .unwrap();

        let cfg = Config::create(mapping(vec![("a", "${upper:abc, d\\,e}".into())]))
            .unwrap()
            .with_resolvers(Arc::new(registry));
        assert_eq!(cfg.get("a").unwrap(), Value::from("ABC,D,E"));

        let plain = Config::create(mapping(vec![("a", "${upper:abc}".into())])).unwrap();
        assert!(plain.get("a").is_err());
    }

    #[test]
    fn test_typed_leaf_coerces_result() {
        let schema = StructSchema::builder("Server")
            .field(Field::new("port", TypeSpec::Int).default("${port_text}"))
            .field(Field::new("port_text", TypeSpec::Str).default("8080"))
            .build();
        let cfg = Config::structured(&StructValue::new(&schema)).unwrap();

        assert_eq!(cfg.get("port").unwrap(), Value::Integer(8080));
    }

    #[test]
    fn test_interpolated_container() {
        let mut cfg = Config::create(mapping(vec![
            ("base", mapping(vec![("x", 1.into())])),
            ("alias", mapping(vec![])),
        ]))
        .unwrap();
        cfg.set("alias", "${base}").unwrap();

        assert_eq!(cfg.select("alias.x").unwrap().unwrap(), Value::Integer(1));
        assert_eq!(
            cfg.to_value(true, EnumRepr::Name).unwrap(),
            mapping(vec![
                ("base", mapping(vec![("x", 1.into())])),
                ("alias", mapping(vec![("x", 1.into())])),
            ])
        );
        assert_eq!(
            cfg.to_value(false, EnumRepr::Name).unwrap(),
            mapping(vec![
                ("base", mapping(vec![("x", 1.into())])),
                ("alias", "${base}".into()),
            ])
        );
    }
}
