//! Abstract syntax tree produced by [`QueryBuilder::to_ast`].
//!
//! Pattern nodes form a closed tagged union so consumers (the analyzer, the
//! serializer) match every kind exhaustively instead of sniffing shapes. The
//! serde representation mirrors the usual JSON algebra layout (`type`,
//! `triples`, `patterns`) so untyped trees can be analyzed the same way.
//!
//! [`QueryBuilder::to_ast`]: crate::query::QueryBuilder::to_ast

use serde::{Deserialize, Serialize};

use crate::term::Term;

/// Term as it appears inside the AST.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "termType")]
pub enum AstTerm {
    /// IRI node.
    NamedNode {
        /// Absolute IRI.
        value: String,
    },
    /// Variable, passed through unchanged.
    Variable {
        /// Name without `?`.
        value: String,
    },
    /// Blank node.
    BlankNode {
        /// Label without `_:`.
        label: String,
    },
    /// Literal; `language` is empty when absent.
    Literal {
        /// Lexical form.
        value: String,
        /// Language tag or the empty string.
        language: String,
        /// Datatype IRI node when the literal is typed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<Box<AstTerm>>,
    },
}

impl AstTerm {
    /// IRI of a named node.
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            AstTerm::NamedNode { value } => Some(value),
            _ => None,
        }
    }
}

impl From<&Term> for AstTerm {
    fn from(term: &Term) -> Self {
        match term {
            Term::NamedNode { value } => AstTerm::NamedNode {
                value: value.clone(),
            },
            Term::Variable { value } => AstTerm::Variable {
                value: value.clone(),
            },
            Term::BlankNode { value } => AstTerm::BlankNode {
                label: value.clone(),
            },
            Term::Literal {
                value,
                language,
                datatype,
            } => AstTerm::Literal {
                value: value.clone(),
                language: language.clone().unwrap_or_default(),
                datatype: datatype.as_ref().map(|iri| {
                    Box::new(AstTerm::NamedNode {
                        value: iri.clone(),
                    })
                }),
            },
        }
    }
}

/// One triple pattern.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriplePattern {
    /// Subject position.
    pub subject: AstTerm,
    /// Predicate position.
    pub predicate: AstTerm,
    /// Object position.
    pub object: AstTerm,
}

impl TriplePattern {
    /// Iterates the three positions in subject, predicate, object order.
    pub fn positions(&self) -> [&AstTerm; 3] {
        [&self.subject, &self.predicate, &self.object]
    }
}

/// Graph pattern node kinds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PatternNode {
    /// Basic graph pattern: a run of required triples.
    Bgp {
        /// Triples in insertion order.
        triples: Vec<TriplePattern>,
    },
    /// `OPTIONAL { ... }`.
    Optional {
        /// Nested patterns.
        patterns: Vec<PatternNode>,
    },
    /// `{ ... }` group.
    Group {
        /// Nested patterns.
        patterns: Vec<PatternNode>,
    },
    /// `FILTER(...)` carrying a raw expression.
    Filter {
        /// Expression text, rendered verbatim.
        expression: String,
    },
    /// `SERVICE <endpoint> { ... }` with an opaque body.
    Service {
        /// Endpoint IRI.
        endpoint: String,
        /// Whether failures of the remote endpoint are ignored.
        silent: bool,
        /// Body text, rendered verbatim.
        body: String,
    },
}

/// Top-level query tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAst {
    /// Query form; always `SELECT` for builder output.
    #[serde(rename = "queryType")]
    pub query_type: QueryType,
    /// Declared prefixes in declaration order, serialized as a JSON object.
    #[serde(with = "prefix_map")]
    pub prefixes: Vec<(String, String)>,
    /// Projected variables; empty means `*`.
    pub variables: Vec<String>,
    /// WHERE clause.
    #[serde(rename = "where")]
    pub where_patterns: Vec<PatternNode>,
    /// Result limit copied from the builder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

/// Supported query forms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    /// Tabular solutions.
    #[default]
    Select,
}

mod prefix_map {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(prefixes: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(prefixes.len()))?;
        for (short, namespace) in prefixes {
            map.serialize_entry(short, namespace)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PrefixVisitor;

        impl<'de> Visitor<'de> for PrefixVisitor {
            type Value = Vec<(String, String)>;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of prefix names to namespaces")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut out = Vec::new();
                while let Some((short, namespace)) = access.next_entry::<String, String>()? {
                    out.push((short, namespace));
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(PrefixVisitor)
    }
}
