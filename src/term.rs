//! RDF term model shared by the builder, engines, validators and policies.
//!
//! Only four term kinds exist: named nodes, variables, blank nodes and
//! literals. Anything else arriving from a backend or a JSON payload is
//! rejected with [`PipelineError::UnsupportedTermKind`].

use std::fmt;

use oxigraph::model::{BlankNode, Literal, NamedNode, Variable};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};

/// `xsd:string`, the implicit datatype of plain literals.
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
/// `rdf:langString`, the implicit datatype of language-tagged literals.
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";
/// `rdf:type`.
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// A single RDF term.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "termType", rename_all = "PascalCase")]
pub enum Term {
    /// IRI-identified resource.
    NamedNode {
        /// Absolute IRI.
        value: String,
    },
    /// Query variable, stored without the leading `?`.
    Variable {
        /// Variable name.
        value: String,
    },
    /// Blank node.
    BlankNode {
        /// Label without the `_:` prefix.
        value: String,
    },
    /// Literal value with optional language tag or datatype.
    Literal {
        /// Lexical form.
        value: String,
        /// Language tag, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        /// Datatype IRI, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
    },
}

impl Term {
    /// Named node for `iri`.
    pub fn named(iri: impl Into<String>) -> Self {
        Term::NamedNode { value: iri.into() }
    }

    /// Variable called `name`; a leading `?` or `$` is stripped.
    pub fn var(name: impl AsRef<str>) -> Self {
        Term::Variable {
            value: strip_variable_sigil(name.as_ref()).to_owned(),
        }
    }

    /// Blank node labelled `label`.
    pub fn blank(label: impl Into<String>) -> Self {
        Term::BlankNode {
            value: label.into(),
        }
    }

    /// Plain literal.
    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            language: None,
            datatype: None,
        }
    }

    /// Language-tagged literal.
    pub fn lang_literal(value: impl Into<String>, language: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            language: Some(language.into()),
            datatype: None,
        }
    }

    /// Typed literal.
    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            language: None,
            datatype: Some(datatype.into()),
        }
    }

    /// Checks that the term can be written into query text verbatim.
    ///
    /// IRIs, datatypes, variable names, blank labels and language tags must
    /// be syntactically valid. Literal values are escaped when rendered.
    pub fn check_syntax(&self) -> Result<()> {
        match self {
            Term::NamedNode { value } => check_iri(value),
            Term::Variable { value } => Variable::new(value.as_str())
                .map(drop)
                .map_err(|e| PipelineError::invalid_term(format!("?{value}"), e.to_string())),
            Term::BlankNode { value } => BlankNode::new(value.as_str())
                .map(drop)
                .map_err(|e| PipelineError::invalid_term(format!("_:{value}"), e.to_string())),
            Term::Literal {
                value,
                language,
                datatype,
            } => {
                if let Some(language) = language {
                    Literal::new_language_tagged_literal(value.as_str(), language.as_str())
                        .map_err(|e| PipelineError::invalid_term(format!("@{language}"), e.to_string()))?;
                }
                match datatype {
                    Some(datatype) => check_iri(datatype),
                    None => Ok(()),
                }
            }
        }
    }

    /// Lexical value: IRI, variable name, blank label or literal form.
    pub fn value(&self) -> &str {
        match self {
            Term::NamedNode { value }
            | Term::Variable { value }
            | Term::BlankNode { value }
            | Term::Literal { value, .. } => value,
        }
    }

    /// Kind name as used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Term::NamedNode { .. } => "NamedNode",
            Term::Variable { .. } => "Variable",
            Term::BlankNode { .. } => "BlankNode",
            Term::Literal { .. } => "Literal",
        }
    }

    /// IRI of a named node.
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::NamedNode { value } => Some(value),
            _ => None,
        }
    }

    /// Variable name of a variable term.
    pub fn as_variable(&self) -> Option<&str> {
        match self {
            Term::Variable { value } => Some(value),
            _ => None,
        }
    }

    /// Whether this is a named node.
    pub fn is_named(&self) -> bool {
        matches!(self, Term::NamedNode { .. })
    }

    /// Effective datatype of a literal, applying the RDF 1.1 defaults.
    pub fn effective_datatype(&self) -> Option<&str> {
        match self {
            Term::Literal {
                datatype: Some(datatype),
                ..
            } => Some(datatype),
            Term::Literal {
                language: Some(_), ..
            } => Some(RDF_LANG_STRING),
            Term::Literal { .. } => Some(XSD_STRING),
            _ => None,
        }
    }

    /// Decodes a JSON term object (`{"termType": ..., "value": ...}`).
    ///
    /// Unknown `termType` values such as `Quad` or `DefaultGraph` fail with
    /// [`PipelineError::UnsupportedTermKind`].
    pub fn from_json(value: &Value) -> Result<Self> {
        let kind = value
            .get("termType")
            .and_then(Value::as_str)
            .ok_or_else(|| PipelineError::unsupported_term(value.to_string()))?;
        match kind {
            "NamedNode" | "Variable" | "BlankNode" | "Literal" => {
                serde_json::from_value(value.clone())
                    .map_err(|err| PipelineError::invalid_term(value.to_string(), err.to_string()))
            }
            other => Err(PipelineError::unsupported_term(other)),
        }
    }

    /// Parses the shorthand used in declarative configuration.
    ///
    /// Accepted forms: `?name`, `<iri>`, `prefix:local`, `_:label`,
    /// `"text"`, `"text"@lang` and `"text"^^<iri>` (or `^^prefix:local`).
    pub fn parse_shorthand(text: &str, prefixes: &[(String, String)]) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::invalid_term(text, "empty term"));
        }
        if let Some(name) = text.strip_prefix('?').or_else(|| text.strip_prefix('$')) {
            if name.is_empty() {
                return Err(PipelineError::invalid_term(text, "empty variable name"));
            }
            return Ok(Term::var(name));
        }
        if let Some(label) = text.strip_prefix("_:") {
            return Ok(Term::blank(label));
        }
        if let Some(inner) = text.strip_prefix('<') {
            return inner
                .strip_suffix('>')
                .map(Term::named)
                .ok_or_else(|| PipelineError::invalid_term(text, "unterminated IRI"));
        }
        if let Some(rest) = text.strip_prefix('"') {
            let close = rest
                .rfind('"')
                .ok_or_else(|| PipelineError::invalid_term(text, "unterminated literal"))?;
            let lexical = rest[..close].replace("\\\"", "\"");
            let suffix = &rest[close + 1..];
            if suffix.is_empty() {
                return Ok(Term::literal(lexical));
            }
            if let Some(lang) = suffix.strip_prefix('@') {
                return Ok(Term::lang_literal(lexical, lang));
            }
            if let Some(datatype) = suffix.strip_prefix("^^") {
                let datatype = match Term::parse_shorthand(datatype, prefixes)? {
                    Term::NamedNode { value } => value,
                    other => {
                        return Err(PipelineError::invalid_term(
                            text,
                            format!("datatype must be an IRI, got {}", other.kind()),
                        ))
                    }
                };
                return Ok(Term::typed_literal(lexical, datatype));
            }
            return Err(PipelineError::invalid_term(text, "unexpected literal suffix"));
        }
        if let Some((prefix, local)) = text.split_once(':') {
            return prefixes
                .iter()
                .find(|(short, _)| short == prefix)
                .map(|(_, namespace)| Term::named(format!("{namespace}{local}")))
                .ok_or_else(|| {
                    PipelineError::invalid_term(text, format!("undeclared prefix '{prefix}'"))
                });
        }
        Err(PipelineError::invalid_term(text, "unrecognized term syntax"))
    }
}

impl fmt::Display for Term {
    /// Formats the term in N-Triples / SPARQL syntax.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::NamedNode { value } => write!(f, "<{value}>"),
            Term::Variable { value } => write!(f, "?{value}"),
            Term::BlankNode { value } => write!(f, "_:{value}"),
            Term::Literal {
                value,
                language,
                datatype,
            } => {
                write!(f, "\"{}\"", escape_literal(value))?;
                if let Some(language) = language {
                    write!(f, "@{language}")
                } else if let Some(datatype) = datatype {
                    write!(f, "^^<{datatype}>")
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl From<&str> for Term {
    /// `?x` becomes a variable, anything else a named node.
    fn from(value: &str) -> Self {
        if value.starts_with('?') || value.starts_with('$') {
            Term::var(value)
        } else {
            Term::named(value)
        }
    }
}

impl From<String> for Term {
    fn from(value: String) -> Self {
        Term::from(value.as_str())
    }
}

/// Rejects text that is not an absolute IRI.
pub(crate) fn check_iri(iri: &str) -> Result<()> {
    NamedNode::new(iri)
        .map(drop)
        .map_err(|e| PipelineError::invalid_term(iri, e.to_string()))
}

pub(crate) fn strip_variable_sigil(name: &str) -> &str {
    name.strip_prefix('?')
        .or_else(|| name.strip_prefix('$'))
        .unwrap_or(name)
}

pub(crate) fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Subject, predicate, object and optional graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quad {
    /// Subject term.
    pub subject: Term,
    /// Predicate term.
    pub predicate: Term,
    /// Object term.
    pub object: Term,
    /// Named graph; `None` for the default graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<Term>,
}

impl Quad {
    /// Quad in the default graph.
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
            graph: None,
        }
    }

    /// Places the quad in `graph`.
    pub fn in_graph(mut self, graph: Term) -> Self {
        self.graph = Some(graph);
        self
    }
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)?;
        if let Some(graph) = &self.graph {
            write!(f, " {graph}")?;
        }
        write!(f, " .")
    }
}

/// One solution of a query: variable name to term, in arrival order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingRow {
    entries: Vec<(String, Term)>,
}

impl BindingRow {
    /// Empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `variable` (sigil optional), replacing a previous binding.
    pub fn insert(&mut self, variable: impl AsRef<str>, term: Term) {
        let name = strip_variable_sigil(variable.as_ref());
        match self.entries.iter_mut().find(|(key, _)| key == name) {
            Some(slot) => slot.1 = term,
            None => self.entries.push((name.to_owned(), term)),
        }
    }

    /// Builder-style [`BindingRow::insert`].
    pub fn with(mut self, variable: impl AsRef<str>, term: Term) -> Self {
        self.insert(variable, term);
        self
    }

    /// Term bound to `variable`, if any.
    pub fn get(&self, variable: &str) -> Option<&Term> {
        let name = strip_variable_sigil(variable);
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, term)| term)
    }

    /// Lexical value bound to `variable`, if any.
    pub fn value(&self, variable: &str) -> Option<&str> {
        self.get(variable).map(Term::value)
    }

    /// Iterates bindings in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.entries.iter().map(|(key, term)| (key.as_str(), term))
    }

    /// Number of bound variables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no variable is bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Substitutes a variable with its binding; other terms pass through.
    ///
    /// Returns `None` when the variable is unbound in this row.
    pub fn resolve(&self, term: &Term) -> Option<Term> {
        match term {
            Term::Variable { value } => self.get(value).cloned(),
            other => Some(other.clone()),
        }
    }
}

impl<K: AsRef<str>> FromIterator<(K, Term)> for BindingRow {
    fn from_iter<I: IntoIterator<Item = (K, Term)>>(iter: I) -> Self {
        let mut row = BindingRow::new();
        for (key, term) in iter {
            row.insert(key, term);
        }
        row
    }
}
