//! Resolver registry
//!
//! Resolvers are named functions called by interpolations like
//! `${env:HOME}`. They receive positional string arguments and return a
//! value. A process-wide registry holds the resolvers every config uses
//! unless a config carries its own registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::value::Value;

// Global resolver registry
static GLOBAL_REGISTRY: OnceLock<RwLock<ResolverRegistry>> = OnceLock::new();

/// Get the global resolver registry.
///
/// This registry is lazily initialized with the built-in `env` resolver.
pub fn global_registry() -> &'static RwLock<ResolverRegistry> {
    GLOBAL_REGISTRY.get_or_init(|| RwLock::new(ResolverRegistry::with_builtins()))
}

/// Register a function as a resolver in the global registry.
///
/// Fails if a resolver with the same name is already registered.
pub fn register_resolver<F>(name: impl Into<String>, func: F) -> Result<()>
where
    F: Fn(&[String]) -> Result<Value> + Send + Sync + 'static,
{
    global_registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register_fn(name, func)
}

/// Look up a resolver in the global registry
pub fn get_resolver(name: &str) -> Option<Arc<dyn Resolver>> {
    global_registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
}

/// Reset the global registry to the built-in resolvers
pub fn clear_resolvers() {
    global_registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

/// Trait for resolver implementations
pub trait Resolver: Send + Sync {
    /// Compute a value from the interpolation's positional arguments
    fn resolve(&self, args: &[String]) -> Result<Value>;

    /// Get the name of this resolver
    fn name(&self) -> &str;
}

/// A simple function-based resolver
pub struct FnResolver<F>
where
    F: Fn(&[String]) -> Result<Value> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnResolver<F>
where
    F: Fn(&[String]) -> Result<Value> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Resolver for FnResolver<F>
where
    F: Fn(&[String]) -> Result<Value> + Send + Sync,
{
    fn resolve(&self, args: &[String]) -> Result<Value> {
        (self.func)(args)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Registry of available resolvers
#[derive(Clone)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Arc<dyn Resolver>>,
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("resolvers", &self.names())
            .finish()
    }
}

impl ResolverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            resolvers: HashMap::new(),
        }
    }

    /// Create a registry with the built-in resolvers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.resolvers.insert(
            "env".to_string(),
            Arc::new(FnResolver::new("env", env_resolver)),
        );
        registry
    }

    /// Register a resolver; fails if the name is taken
    pub fn register(&mut self, resolver: Arc<dyn Resolver>) -> Result<()> {
        let name = resolver.name().to_string();
        if self.resolvers.contains_key(&name) {
            return Err(Error::resolver_already_registered(name));
        }
        log::debug!("registered resolver '{}'", name);
        self.resolvers.insert(name, resolver);
        Ok(())
    }

    /// Register a function as a resolver
    pub fn register_fn<F>(&mut self, name: impl Into<String>, func: F) -> Result<()>
    where
        F: Fn(&[String]) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnResolver::new(name, func)))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Resolver>> {
        self.resolvers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.resolvers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every resolver except the built-in ones
    pub fn clear(&mut self) {
        *self = Self::with_builtins();
    }
}

/// Built-in environment variable resolver
///
/// Usage:
///   ${env:VAR_NAME}          - value of the variable, error if not set
///   ${env:VAR_NAME,default}  - value of the variable, or the default
///
/// Values are decoded into booleans and numbers where they parse as such.
fn env_resolver(args: &[String]) -> Result<Value> {
    let (var_name, default) = match args {
        [name] => (name, None),
        [name, default] => (name, Some(default)),
        _ => {
            return Err(Error::resolver_custom(
                "env",
                format!("expected a variable name and an optional default, got {} arguments", args.len()),
            ))
        }
    };

    match std::env::var(var_name) {
        Ok(value) => Ok(decode_primitive(&value)),
        Err(_) => match default {
            Some(d) => Ok(decode_primitive(d)),
            None => Err(Error::env_not_found(var_name)),
        },
    }
}

/// Decode text into a bool, integer or float where it parses as one
pub fn decode_primitive(s: &str) -> Value {
    if s.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if s.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return Value::Float(f);
    }
    Value::String(s.to_string())
}

/// Memoized resolver results: resolver name, then raw argument text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolverCache {
    entries: HashMap<String, HashMap<String, Value>>,
}

impl ResolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resolver: &str, args: &str) -> Option<&Value> {
        self.entries.get(resolver).and_then(|m| m.get(args))
    }

    /// Store `value` unless a result is already cached; returns the cached result
    pub fn insert_if_absent(&mut self, resolver: &str, args: &str, value: Value) -> &Value {
        self.entries
            .entry(resolver.to_string())
            .or_default()
            .entry(args.to_string())
            .or_insert(value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached results across all resolvers
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ResolverErrorKind};

    #[test]
    fn test_env_resolver_with_value() {
        std::env::set_var("TREECONF_TEST_VAR", "test_value");

        let result = env_resolver(&["TREECONF_TEST_VAR".to_string()]).unwrap();
        assert_eq!(result.as_str(), Some("test_value"));

        std::env::remove_var("TREECONF_TEST_VAR");
    }

    #[test]
    fn test_env_resolver_decodes_primitives() {
        std::env::set_var("TREECONF_TEST_PORT", "8080");

        let result = env_resolver(&["TREECONF_TEST_PORT".to_string()]).unwrap();
        assert_eq!(result, Value::Integer(8080));

        std::env::remove_var("TREECONF_TEST_PORT");
    }

    #[test]
    fn test_env_resolver_default() {
        std::env::remove_var("TREECONF_UNSET_VAR");

        let result =
            env_resolver(&["TREECONF_UNSET_VAR".to_string(), "True".to_string()]).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn test_env_resolver_missing_returns_error() {
        std::env::remove_var("TREECONF_NONEXISTENT_VAR");

        let err = env_resolver(&["TREECONF_NONEXISTENT_VAR".to_string()]).unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::Resolver(ResolverErrorKind::EnvNotFound { .. })
        ));
    }

    #[test]
    fn test_env_resolver_arity() {
        assert!(env_resolver(&[]).is_err());
        let args = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        assert!(env_resolver(&args).is_err());
    }

    #[test]
    fn test_decode_primitive() {
        assert_eq!(decode_primitive("TRUE"), Value::Bool(true));
        assert_eq!(decode_primitive("false"), Value::Bool(false));
        assert_eq!(decode_primitive("-12"), Value::Integer(-12));
        assert_eq!(decode_primitive("1.5"), Value::Float(1.5));
        assert_eq!(decode_primitive("localhost"), Value::from("localhost"));
    }

    #[test]
    fn test_resolver_registry() {
        let registry = ResolverRegistry::with_builtins();

        assert!(registry.contains("env"));
        assert!(!registry.contains("nonexistent"));
    }

    #[test]
    fn test_custom_resolver() {
        let mut registry = ResolverRegistry::new();

        registry
            .register_fn("custom", |args| {
                Ok(Value::String(format!("custom:{}", args.join("+"))))
            })
            .unwrap();

        let resolver = registry.get("custom").unwrap();
        let result = resolver
            .resolve(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(result.as_str(), Some("custom:a+b"));
    }

    #[test]
    fn test_register_twice_fails() {
        let mut registry = ResolverRegistry::with_builtins();
        let err = registry
            .register_fn("env", |_| Ok(Value::Null))
            .unwrap_err();

        assert!(matches!(
            err.kind,
            ErrorKind::Resolver(ResolverErrorKind::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn test_clear_keeps_builtins() {
        let mut registry = ResolverRegistry::with_builtins();
        registry.register_fn("temp", |_| Ok(Value::Null)).unwrap();
        assert_eq!(registry.names(), vec!["env", "temp"]);

        registry.clear();
        assert_eq!(registry.names(), vec!["env"]);
    }

    #[test]
    fn test_global_register_and_get() {
        register_resolver("resolver_test_global", |_| Ok(Value::Integer(1))).unwrap();
        assert!(get_resolver("resolver_test_global").is_some());
        assert!(register_resolver("resolver_test_global", |_| Ok(Value::Null)).is_err());
        assert!(get_resolver("resolver_test_unknown").is_none());
    }

    #[test]
    fn test_resolver_cache() {
        let mut cache = ResolverCache::new();
        assert!(cache.is_empty());

        cache.insert_if_absent("random", "a", Value::Integer(1));
        let kept = cache.insert_if_absent("random", "a", Value::Integer(2)).clone();
        assert_eq!(kept, Value::Integer(1));

        cache.insert_if_absent("random", "b", Value::Integer(3));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("random", "b"), Some(&Value::Integer(3)));

        cache.clear();
        assert!(cache.get("random", "a").is_none());
    }
}
