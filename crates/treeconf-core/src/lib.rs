//! treeconf-core: typed, mergeable configuration trees with interpolation
//!
//! A config is built from primitive data or from a schema, merged with other
//! configs, and read through `${...}` placeholders that resolve lazily.
//!
//! # Example
//!
//! ```rust
//! use treeconf_core::{merge, Config, Value};
//!
//! let defaults = Config::create(Value::from_iter([
//!     ("host", Value::from("localhost")),
//!     ("port", Value::from(5432)),
//!     ("url", Value::from("db://${host}:${port}")),
//! ])).unwrap();
//! let overrides = Config::create(Value::from_iter([("port", 6543)])).unwrap();
//!
//! let config = merge(&defaults, &[&overrides]).unwrap();
//! assert_eq!(config.get("url").unwrap(), Value::from("db://localhost:6543"));
//! ```

pub mod error;
pub mod interpolation;
pub mod resolver;
pub mod schema;
pub mod types;
pub mod value;

mod config;
mod container;
mod merge;
mod node;
mod resolve;
mod tree;
mod wrap;

pub use config::{merge, merge_values, Config};
pub use container::{Container, ContainerMut, EnumRepr, Item, NodeRef};
pub use error::{Error, ErrorKind, Result};
pub use node::Flag;
pub use resolver::{
    clear_resolvers, get_resolver, register_resolver, Resolver, ResolverCache, ResolverRegistry,
};
pub use schema::{Field, StructSchema, StructValue, Structured};
pub use types::{EnumType, EnumValue, Key, KeyType, TypeSpec};
pub use value::Value;
