//! Error types for treeconf
//!
//! Every failure carries its kind, the full key of the node it concerns
//! (e.g. `database.users[0].name`), an optional cause and a help message.

use std::fmt;

/// Result type alias for treeconf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for treeconf operations
#[derive(Debug, Clone)]
pub struct Error {
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Full key of the node where the error occurred
    pub path: Option<String>,
    /// Actionable help message
    pub help: Option<String>,
    /// Underlying cause (as string for Clone compatibility)
    pub cause: Option<String>,
}

/// Categories of errors that can occur
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// Key has the wrong type for the container, or an index is out of range
    #[error("Key validation error")]
    KeyValidation,
    /// Value failed coercion or schema type checks
    #[error("Validation error")]
    Validation,
    /// Value cannot be stored in the tree at all
    #[error("Unsupported value type")]
    UnsupportedValueType,
    /// A read reached the `???` marker
    #[error("Missing mandatory value")]
    MissingMandatoryValue,
    /// Interpolation names a resolver that is not registered
    #[error("Unsupported interpolation type {0}")]
    UnsupportedInterpolationType(String),
    /// Mutation of a read-only node
    #[error("Cannot change read-only config container")]
    ReadonlyConfig,
    /// Mapping and sequence shapes do not line up
    #[error("Type error")]
    Type,
    /// Operation is undefined for the given value
    #[error("Value error")]
    Value,
    /// Key is not declared by a typed or struct-mode container
    #[error("Key not in struct")]
    UnknownKey,
    /// Key is absent from an open container
    #[error("Key not found")]
    KeyNotFound,
    /// Interpolation points at a path that does not exist
    #[error("Referenced path not found: {0}")]
    ReferenceNotFound(String),
    /// Interpolations form a cycle
    #[error("Circular reference detected")]
    CircularReference,
    /// A schema cannot be bound
    #[error("Schema error")]
    Schema,
    /// Error raised while running a resolver
    #[error("{0}")]
    Resolver(ResolverErrorKind),
    /// Internal error (bug in treeconf)
    #[error("Internal error")]
    Internal,
}

/// Specific resolver error categories
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolverErrorKind {
    /// Environment variable not found
    #[error("Environment variable not found: {var_name}")]
    EnvNotFound { var_name: String },
    /// Resolver already registered
    #[error("Resolver '{name}' is already registered")]
    AlreadyRegistered { name: String },
    /// Resolver returned an error
    #[error("Resolver '{resolver}' error: {message}")]
    Custom { resolver: String, message: String },
}

fn non_root(path: String) -> Option<String> {
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

impl Error {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: None,
            help: None,
            cause: None,
        }
    }

    /// Create a key validation error
    pub fn key_validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: non_root(path.into()),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::KeyValidation)
        }
    }

    /// Create a validation error
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: non_root(path.into()),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Validation)
        }
    }

    /// Create an unsupported value type error
    pub fn unsupported_value_type(path: impl Into<String>, type_name: &str) -> Self {
        Self {
            path: non_root(path.into()),
            cause: Some(format!("Value of type '{}' cannot be stored here", type_name)),
            ..Self::new(ErrorKind::UnsupportedValueType)
        }
    }

    /// Create a missing mandatory value error
    pub fn missing_mandatory_value(path: impl Into<String>) -> Self {
        Self {
            path: non_root(path.into()),
            help: Some("Provide a value for this key or read it with a default".into()),
            ..Self::new(ErrorKind::MissingMandatoryValue)
        }
    }

    /// Create an unsupported interpolation type error
    pub fn unsupported_interpolation_type(name: impl Into<String>, path: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: non_root(path.into()),
            help: Some(format!("Register the '{}' resolver or check for typos", name)),
            ..Self::new(ErrorKind::UnsupportedInterpolationType(name))
        }
    }

    /// Create a read-only error
    pub fn readonly(path: impl Into<String>) -> Self {
        Self {
            path: non_root(path.into()),
            help: Some("Wrap the change in read_write(...) to modify this node".into()),
            ..Self::new(ErrorKind::ReadonlyConfig)
        }
    }

    /// Create a shape mismatch error
    pub fn type_mismatch(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: non_root(path.into()),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Type)
        }
    }

    /// Create a value error
    pub fn value(message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Value)
        }
    }

    /// Create an unknown key error for typed or struct-mode containers
    pub fn unknown_key(path: impl Into<String>, key: impl fmt::Display) -> Self {
        Self {
            path: non_root(path.into()),
            cause: Some(format!("Key '{}' is not declared", key)),
            help: Some("Use open_dict(...) to add keys to a struct-mode container".into()),
            ..Self::new(ErrorKind::UnknownKey)
        }
    }

    /// Create a key not found error
    pub fn key_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            help: Some(format!("Check that '{}' exists in the configuration", path)),
            path: non_root(path),
            ..Self::new(ErrorKind::KeyNotFound)
        }
    }

    /// Create a reference not found error
    pub fn reference_not_found(ref_path: impl Into<String>, path: impl Into<String>) -> Self {
        let ref_path = ref_path.into();
        Self {
            path: non_root(path.into()),
            help: Some(format!(
                "Check that '{}' exists in the configuration",
                ref_path
            )),
            ..Self::new(ErrorKind::ReferenceNotFound(ref_path))
        }
    }

    /// Create a circular reference error
    pub fn circular_reference(path: impl Into<String>, chain: Vec<String>) -> Self {
        Self {
            path: non_root(path.into()),
            help: Some("Break the circular dependency by removing one of the references".into()),
            cause: Some(format!("Chain: {}", chain.join(" -> "))),
            ..Self::new(ErrorKind::CircularReference)
        }
    }

    /// Create a schema binding error
    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: non_root(path.into()),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Schema)
        }
    }

    /// Create an env var not found error
    pub fn env_not_found(var_name: impl Into<String>) -> Self {
        let var = var_name.into();
        Self {
            help: Some(format!(
                "Set the {} environment variable or provide a default: ${{env:{},value}}",
                var, var
            )),
            ..Self::new(ErrorKind::Resolver(ResolverErrorKind::EnvNotFound {
                var_name: var,
            }))
        }
    }

    /// Create a resolver already registered error
    pub fn resolver_already_registered(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            help: Some(format!(
                "Clear the registry or pick another name than '{}'",
                name
            )),
            ..Self::new(ErrorKind::Resolver(ResolverErrorKind::AlreadyRegistered {
                name,
            }))
        }
    }

    /// Create a custom resolver error
    pub fn resolver_custom(resolver: impl Into<String>, message: impl Into<String>) -> Self {
        let resolver = resolver.into();
        Self {
            help: Some(format!("Check the '{}' resolver implementation", resolver)),
            ..Self::new(ErrorKind::Resolver(ResolverErrorKind::Custom {
                resolver,
                message: message.into(),
            }))
        }
    }

    /// Create an internal error (bug in treeconf)
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            help: Some("This is likely a bug in treeconf. Please report it.".into()),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Internal)
        }
    }

    /// Add path context to the error
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = non_root(path.into());
        self
    }

    /// Add path context unless the error already has one
    pub fn or_path(self, path: impl Into<String>) -> Self {
        if self.path.is_some() {
            self
        } else {
            self.with_path(path)
        }
    }

    /// Add help message to the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Whether this error means "no value here" rather than "broken value"
    pub fn is_absent(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::MissingMandatoryValue
                | ErrorKind::KeyNotFound
                | ErrorKind::UnknownKey
                | ErrorKind::KeyValidation
                | ErrorKind::ReferenceNotFound(_)
                | ErrorKind::Resolver(ResolverErrorKind::EnvNotFound { .. })
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if let Some(path) = &self.path {
            write!(f, "\n  Path: {}", path)?;
        }

        if let Some(cause) = &self.cause {
            write!(f, "\n  {}", cause)?;
        }

        if let Some(help) = &self.help {
            write!(f, "\n  Help: {}", help)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}
