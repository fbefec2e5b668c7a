//! Per-query output contract: which shape rows must satisfy, which variable
//! is the focus node, how to rebuild a row's local graph and how to map the
//! row into a DTO.

use std::fmt;

use crate::error::Result;
use crate::query::PatternEntry;
use crate::term::{strip_variable_sigil, BindingRow, Quad};

pub use crate::shape::ShapeRef;

type QuadFn = dyn Fn(&BindingRow) -> Vec<Quad> + Send + Sync;
type MapFn<T> = dyn Fn(&BindingRow) -> Result<T> + Send + Sync;

/// Output contract attached to a [`QueryBuilder`](crate::query::QueryBuilder).
///
/// Immutable once constructed.
pub struct OutputSpec<T> {
    shape: ShapeRef,
    focus_variable: String,
    build_quads: Box<QuadFn>,
    map_to_object: Box<MapFn<T>>,
}

impl<T> OutputSpec<T> {
    /// Creates a spec from its four parts.
    pub fn new<Q, M>(
        shape: ShapeRef,
        focus_variable: impl AsRef<str>,
        build_quads: Q,
        map_to_object: M,
    ) -> Self
    where
        Q: Fn(&BindingRow) -> Vec<Quad> + Send + Sync + 'static,
        M: Fn(&BindingRow) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            shape,
            focus_variable: strip_variable_sigil(focus_variable.as_ref()).to_owned(),
            build_quads: Box::new(build_quads),
            map_to_object: Box::new(map_to_object),
        }
    }

    /// Creates a spec whose local graph is the query's own triple patterns
    /// instantiated with each row's bindings.
    ///
    /// Patterns that still contain an unbound variable after substitution
    /// (typically optional triples that did not match) are left out.
    pub fn from_patterns<M>(
        shape: ShapeRef,
        focus_variable: impl AsRef<str>,
        patterns: &[PatternEntry],
        map_to_object: M,
    ) -> Self
    where
        M: Fn(&BindingRow) -> Result<T> + Send + Sync + 'static,
    {
        let patterns = patterns.to_vec();
        Self::new(
            shape,
            focus_variable,
            move |row| instantiate_patterns(&patterns, row),
            map_to_object,
        )
    }

    /// Shape the local graph must satisfy.
    pub fn shape(&self) -> &ShapeRef {
        &self.shape
    }

    /// Focus variable name without `?`.
    pub fn focus_variable(&self) -> &str {
        &self.focus_variable
    }

    /// Rebuilds the local graph for `row`.
    pub fn build_quads(&self, row: &BindingRow) -> Vec<Quad> {
        (self.build_quads)(row)
    }

    /// Maps `row` into the DTO.
    pub fn map_to_object(&self, row: &BindingRow) -> Result<T> {
        (self.map_to_object)(row)
    }
}

impl<T> fmt::Debug for OutputSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSpec")
            .field("shape", &self.shape)
            .field("focus_variable", &self.focus_variable)
            .finish_non_exhaustive()
    }
}

/// Substitutes row bindings into `patterns`, dropping partially bound ones.
pub fn instantiate_patterns(patterns: &[PatternEntry], row: &BindingRow) -> Vec<Quad> {
    patterns
        .iter()
        .filter_map(|pattern| {
            let subject = row.resolve(&pattern.subject)?;
            let predicate = row.resolve(&pattern.predicate)?;
            let object = row.resolve(&pattern.object)?;
            Some(Quad::new(subject, predicate, object))
        })
        .collect()
}
