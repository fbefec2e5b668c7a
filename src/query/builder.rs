//! Fluent query builder.

use std::fmt;

use crate::error::{PipelineError, Result};
use crate::output::OutputSpec;
use crate::query::{
    ast::{AstTerm, PatternNode, QueryAst, QueryType, TriplePattern},
    sparql::{QuerySerializer, SparqlSerializer},
};
use crate::term::{check_iri, strip_variable_sigil, Term};

/// Triple pattern recorded by the builder, tagged optional or required.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternEntry {
    /// Subject term.
    pub subject: Term,
    /// Predicate term.
    pub predicate: Term,
    /// Object term.
    pub object: Term,
    /// Whether the triple sits in an `OPTIONAL` block.
    pub optional: bool,
}

impl PatternEntry {
    fn to_triple(&self) -> TriplePattern {
        TriplePattern {
            subject: AstTerm::from(&self.subject),
            predicate: AstTerm::from(&self.predicate),
            object: AstTerm::from(&self.object),
        }
    }
}

/// Accumulates query structure plus the output spec used to shape rows.
///
/// One builder is created per logical query and handed to downstream stages
/// by shared reference once built.
pub struct QueryBuilder<T = serde_json::Value> {
    prefixes: Vec<(String, String)>,
    variables: Vec<String>,
    patterns: Vec<PatternEntry>,
    filters: Vec<String>,
    limit: Option<u64>,
    output: Option<OutputSpec<T>>,
    error: Option<PipelineError>,
}

impl<T> Default for QueryBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for QueryBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("prefixes", &self.prefixes)
            .field("variables", &self.variables)
            .field("patterns", &self.patterns)
            .field("filters", &self.filters)
            .field("limit", &self.limit)
            .field("has_output_spec", &self.output.is_some())
            .field("error", &self.error)
            .finish()
    }
}

impl<T> QueryBuilder<T> {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            prefixes: Vec::new(),
            variables: Vec::new(),
            patterns: Vec::new(),
            filters: Vec::new(),
            limit: None,
            output: None,
            error: None,
        }
    }

    /// Declares `short:` as an abbreviation for `namespace`.
    ///
    /// Re-declaring a prefix replaces its namespace in place. A malformed
    /// short name or namespace IRI is recorded and fails [`QueryBuilder::to_ast`].
    pub fn prefix(mut self, short: impl Into<String>, namespace: impl Into<String>) -> Self {
        let short = short.into();
        let namespace = namespace.into();
        if !is_prefix_name(&short) {
            self.record_error(PipelineError::invalid_term(
                format!("{short}:"),
                "prefix names are letters, digits, '_' and '-' starting with a letter",
            ));
        }
        if let Err(err) = check_iri(&namespace) {
            self.record_error(err);
        }
        match self.prefixes.iter_mut().find(|(name, _)| *name == short) {
            Some(slot) => slot.1 = namespace,
            None => self.prefixes.push((short, namespace)),
        }
        self
    }

    /// Sets the projected variables, replacing any previous projection.
    pub fn select_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.variables = variables
            .into_iter()
            .map(|name| strip_variable_sigil(name.as_ref()).to_owned())
            .collect();
        let invalid = self
            .variables
            .iter()
            .find_map(|name| Term::var(name).check_syntax().err());
        if let Some(err) = invalid {
            self.record_error(err);
        }
        self
    }

    /// Adds a required triple pattern.
    pub fn where_triple<S, P, O>(self, subject: S, predicate: P, object: O) -> Self
    where
        S: Into<Term>,
        P: Into<Term>,
        O: Into<Term>,
    {
        self.push_pattern(subject.into(), predicate.into(), object.into(), false)
    }

    /// Adds a triple pattern wrapped in `OPTIONAL`.
    pub fn optional_triple<S, P, O>(self, subject: S, predicate: P, object: O) -> Self
    where
        S: Into<Term>,
        P: Into<Term>,
        O: Into<Term>,
    {
        self.push_pattern(subject.into(), predicate.into(), object.into(), true)
    }

    /// Adds a raw filter expression, rendered verbatim inside `FILTER(...)`.
    pub fn filter(mut self, expression: impl Into<String>) -> Self {
        self.filters.push(expression.into());
        self
    }

    /// Caps the number of solutions.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Attaches the output spec. A builder accepts exactly one; a second call
    /// records [`PipelineError::OutputSpecAlreadySet`].
    pub fn set_output_spec(mut self, spec: OutputSpec<T>) -> Self {
        if self.output.is_some() {
            self.record_error(PipelineError::OutputSpecAlreadySet);
        } else {
            self.output = Some(spec);
        }
        self
    }

    /// Output spec attached to this builder, if any.
    pub fn output_spec(&self) -> Option<&OutputSpec<T>> {
        self.output.as_ref()
    }

    /// Declared prefixes in declaration order.
    pub fn prefixes(&self) -> &[(String, String)] {
        &self.prefixes
    }

    /// Projected variables.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Recorded triple patterns in insertion order.
    pub fn patterns(&self) -> &[PatternEntry] {
        &self.patterns
    }

    /// Records an error surfaced by [`QueryBuilder::to_ast`]; the first one wins.
    pub fn record_error(&mut self, err: PipelineError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Produces the query tree.
    ///
    /// Runs of consecutive required triples become one basic pattern; each
    /// optional triple becomes its own optional node; filters follow the
    /// patterns. Fails with the first error recorded while building.
    pub fn to_ast(&self) -> Result<QueryAst> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let mut where_patterns = Vec::new();
        let mut run: Vec<TriplePattern> = Vec::new();
        for entry in &self.patterns {
            if entry.optional {
                if !run.is_empty() {
                    where_patterns.push(PatternNode::Bgp {
                        triples: std::mem::take(&mut run),
                    });
                }
                where_patterns.push(PatternNode::Optional {
                    patterns: vec![PatternNode::Bgp {
                        triples: vec![entry.to_triple()],
                    }],
                });
            } else {
                run.push(entry.to_triple());
            }
        }
        if !run.is_empty() {
            where_patterns.push(PatternNode::Bgp { triples: run });
        }
        where_patterns.extend(self.filters.iter().map(|expression| PatternNode::Filter {
            expression: expression.clone(),
        }));
        Ok(QueryAst {
            query_type: QueryType::Select,
            prefixes: self.prefixes.clone(),
            variables: self.variables.clone(),
            where_patterns,
            limit: self.limit,
        })
    }

    /// Renders the query with the default SPARQL serializer.
    pub fn to_query_text(&self) -> Result<String> {
        self.to_query_text_with(&SparqlSerializer)
    }

    /// Renders the query with the supplied serializer.
    pub fn to_query_text_with(&self, serializer: &dyn QuerySerializer) -> Result<String> {
        serializer.serialize(&self.to_ast()?)
    }

    fn push_pattern(mut self, subject: Term, predicate: Term, object: Term, optional: bool) -> Self {
        let invalid = [&subject, &predicate, &object]
            .into_iter()
            .find_map(|term| term.check_syntax().err());
        if let Some(err) = invalid {
            tracing::debug!(%err, "rejected triple term");
            self.record_error(err);
        }
        self.patterns.push(PatternEntry {
            subject,
            predicate,
            object,
            optional,
        });
        self
    }
}

fn is_prefix_name(short: &str) -> bool {
    let mut chars = short.chars();
    match chars.next() {
        None => true,
        Some(first) => {
            first.is_ascii_alphabetic()
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
    }
}
