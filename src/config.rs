//! TOML configuration: server binding, engine, allow-list, named shapes and
//! declared operations.
//!
//! ```toml
//! log_level = "info"
//!
//! [server]
//! port = 7878
//!
//! [engine]
//! backend = "auto"
//! store.data = ["people.ttl"]
//!
//! [auth]
//! namespaces = ["http://schema.org/"]
//!
//! [shapes."http://example.org/PersonShape"]
//! properties = [{ path = "http://schema.org/name", min_count = 1 }]
//!
//! [[operations]]
//! name = "listPeople"
//! shape = "http://example.org/PersonShape"
//! focus = "person"
//! select = ["person", "name"]
//! prefixes = { schema = "http://schema.org/" }
//! where = [{ subject = "?person", predicate = "schema:name", object = "?name" }]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::auth::{AllowListConfig, NamespaceAllowList};
use crate::engine::{EngineAdapter, EngineConfig};
use crate::handler::{DeclaredOperation, OperationRegistry, RequestHandler};
use crate::shape::{ShapeDescription, ShapeEngine, ShapeRegistry};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 7878;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`ShapelineConfig`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Offending path.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// Field-level validation failed.
    #[error("invalid config: {0}")]
    Invalid(#[from] validator::ValidationErrors),
    /// Two operations share a name.
    #[error("operation '{name}' is declared more than once")]
    DuplicateOperation {
        /// Repeated name.
        name: String,
    },
    /// No path was given and no config directory exists.
    #[error("no config directory found; pass --config")]
    NoConfigPath,
}

/// HTTP binding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: IpAddr,
    /// Listening port.
    #[validate(range(min = 1))]
    pub port: u16,
    /// CORS origins; empty disables CORS.
    pub allow_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            allow_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Socket address to bind.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}

/// Whole configuration file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ShapelineConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    #[validate(length(min = 1))]
    pub log_level: String,
    /// HTTP binding.
    #[validate(nested)]
    pub server: ServerConfig,
    /// Backend selection and store contents.
    pub engine: EngineConfig,
    /// Namespace allow-list; absent disables authorization.
    #[validate(nested)]
    pub auth: Option<AllowListConfig>,
    /// Shapes addressable by IRI.
    pub shapes: BTreeMap<String, ShapeDescription>,
    /// Declared operations.
    #[validate(nested)]
    pub operations: Vec<DeclaredOperation>,
}

impl Default for ShapelineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            server: ServerConfig::default(),
            engine: EngineConfig::default(),
            auth: None,
            shapes: BTreeMap::new(),
            operations: Vec::new(),
        }
    }
}

impl ShapelineConfig {
    /// Reads, parses and validates `path`.
    ///
    /// Relative data file paths are resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.check()?;
        tracing::debug!(
            path = %path.display(),
            operations = config.operations.len(),
            shapes = config.shapes.len(),
            "config loaded"
        );
        Ok(config)
    }

    /// Loads `explicit`, or the default location when `None`.
    pub fn load_or_default(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        match explicit.or_else(default_config_path) {
            Some(path) if path.exists() => Self::load(&path),
            Some(_) => Ok(Self::default()),
            None => Err(ConfigError::NoConfigPath),
        }
    }

    /// Validates fields and operation name uniqueness.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        let mut seen = BTreeSet::new();
        for op in &self.operations {
            if !seen.insert(op.name.as_str()) {
                return Err(ConfigError::DuplicateOperation {
                    name: op.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        for file in &mut self.engine.store.data {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
    }

    /// Registry holding the configured shapes.
    pub fn shape_registry(&self) -> ShapeRegistry {
        let registry = ShapeRegistry::new();
        for (iri, shape) in &self.shapes {
            registry.register(iri.clone(), shape.clone());
        }
        registry
    }

    /// Registry holding the declared operations.
    pub fn operation_registry(&self) -> OperationRegistry {
        let mut registry = OperationRegistry::new();
        for op in &self.operations {
            registry.register(op.clone());
        }
        registry
    }

    /// Allow-list policy, when `[auth]` is present.
    pub fn policy(&self) -> Option<NamespaceAllowList> {
        self.auth.as_ref().map(NamespaceAllowList::from_config)
    }

    /// Handler wired from this configuration, with `extra` operations
    /// registered on top of the declared ones.
    pub fn build_handler(&self, extra: OperationRegistry) -> RequestHandler {
        let mut registry = self.operation_registry();
        for name in extra.names() {
            if let Some(op) = extra.get(name) {
                registry.register_arc(op);
            }
        }
        let adapter = Arc::new(EngineAdapter::new(self.engine.clone()));
        let validator = Arc::new(ShapeEngine::with_registry(self.shape_registry()));
        let handler = RequestHandler::new(registry, adapter, validator);
        match self.policy() {
            Some(policy) => handler.with_policy(Arc::new(policy)),
            None => handler,
        }
    }
}

/// `<config dir>/shapeline/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("shapeline").join("config.toml"))
}
