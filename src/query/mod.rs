#![forbid(unsafe_code)]

//! Query construction, analysis and rendering.

/// Query tree produced by the builder.
///
/// Pattern nodes are a closed tagged union matched exhaustively downstream.
pub mod ast;

/// Referenced-IRI extraction used by the authorization gate.
pub mod analyze;

/// Fluent builder accumulating prefixes, projection, patterns and filters.
pub mod builder;

/// Rendering of query trees into SPARQL text.
pub mod sparql;

pub use analyze::{analyze, analyze_value, Analysis, ValueAnalysis};
pub use ast::{AstTerm, PatternNode, QueryAst, TriplePattern};
pub use builder::{PatternEntry, QueryBuilder};
pub use sparql::{QuerySerializer, SparqlSerializer};
