//! Shape-checked read pipeline over RDF data.
//!
//! A request names an operation; the operation builds a query, the engine
//! adapter runs it on whichever backend is available, and every result row
//! is authorized, validated against a shape and mapped into a DTO before it
//! reaches the caller.

#![warn(missing_docs)]

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod logging;
pub mod output;
pub mod query;
pub mod server;
pub mod shape;
pub mod shaper;
pub mod term;

pub use auth::{AuthorizationPolicy, NamespaceAllowList, RequestContext};
pub use config::{ConfigError, ShapelineConfig};
pub use engine::{EngineAdapter, EngineConfig, EngineKind, EngineSelection, QueryEngine};
pub use error::{PipelineError, Result};
pub use handler::{HandlerRequest, HandlerResponse, Operation, OperationRegistry, RequestHandler};
pub use output::OutputSpec;
pub use query::QueryBuilder;
pub use shape::{ShapeEngine, ShapeRef, ShapeValidator};
pub use shaper::{shape_all, shape_one};
pub use term::{BindingRow, Quad, Term};
