#![forbid(unsafe_code)]

//! Extraction of referenced IRIs for authorization.
//!
//! The analyzer walks the WHERE clause and collects every named node that
//! appears in a subject, predicate or object position of a basic pattern.
//! Optional and group nodes are descended into; filters and service calls are
//! opaque and contribute nothing.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::query::ast::{PatternNode, QueryAst};

/// Result of analyzing a query tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Analysis {
    /// Tree that was analyzed.
    pub ast: QueryAst,
    /// Distinct IRIs referenced by the WHERE clause.
    pub used_iris: BTreeSet<String>,
    /// Declared prefix mapping.
    pub prefixes: Vec<(String, String)>,
}

/// Analyzes a typed query tree.
pub fn analyze(ast: &QueryAst) -> Analysis {
    let mut used_iris = BTreeSet::new();
    collect_patterns(&ast.where_patterns, &mut used_iris);
    Analysis {
        ast: ast.clone(),
        used_iris,
        prefixes: ast.prefixes.clone(),
    }
}

fn collect_patterns(patterns: &[PatternNode], out: &mut BTreeSet<String>) {
    for node in patterns {
        match node {
            PatternNode::Bgp { triples } => {
                for triple in triples {
                    out.extend(
                        triple
                            .positions()
                            .into_iter()
                            .filter_map(|term| term.as_iri())
                            .map(str::to_owned),
                    );
                }
            }
            PatternNode::Optional { patterns } | PatternNode::Group { patterns } => {
                collect_patterns(patterns, out)
            }
            PatternNode::Filter { .. } | PatternNode::Service { .. } => {}
        }
    }
}

/// IRIs and prefixes extracted from an untyped JSON query tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValueAnalysis {
    /// Distinct IRIs referenced by the WHERE clause.
    pub used_iris: BTreeSet<String>,
    /// Prefix mapping; empty when absent or not an object.
    pub prefixes: Vec<(String, String)>,
}

/// Analyzes a JSON tree laid out like the serde form of [`QueryAst`].
///
/// Trees produced by foreign builders are accepted as long as they follow the
/// same layout: a `where` array of nodes, basic patterns tagged
/// `"type": "bgp"` with a `triples` array, and nested lists under `patterns`.
/// A missing or non-array `where` and a missing or non-object `prefixes`
/// yield empty results.
pub fn analyze_value(tree: &Value) -> ValueAnalysis {
    let mut used_iris = BTreeSet::new();
    if let Some(patterns) = tree.get("where").and_then(Value::as_array) {
        collect_values(patterns, &mut used_iris);
    }
    let prefixes = tree
        .get("prefixes")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(short, ns)| ns.as_str().map(|ns| (short.clone(), ns.to_owned())))
                .collect()
        })
        .unwrap_or_default();
    ValueAnalysis {
        used_iris,
        prefixes,
    }
}

fn collect_values(patterns: &[Value], out: &mut BTreeSet<String>) {
    for node in patterns {
        if node.get("type").and_then(Value::as_str) == Some("bgp") {
            let Some(triples) = node.get("triples").and_then(Value::as_array) else {
                continue;
            };
            for triple in triples {
                for position in ["subject", "predicate", "object"] {
                    if let Some(iri) = triple.get(position).and_then(named_node_value) {
                        out.insert(iri.to_owned());
                    }
                }
            }
        } else if let Some(nested) = node.get("patterns").and_then(Value::as_array) {
            collect_values(nested, out);
        }
    }
}

fn named_node_value(term: &Value) -> Option<&str> {
    if term.get("termType").and_then(Value::as_str) == Some("NamedNode") {
        term.get("value").and_then(Value::as_str)
    } else {
        None
    }
}
