//! Query text rendering.

use std::fmt::Write as _;

use crate::error::{PipelineError, Result};
use crate::query::ast::{AstTerm, PatternNode, QueryAst, TriplePattern};
use crate::term::escape_literal;

/// Renders a query tree into query text.
pub trait QuerySerializer: Send + Sync {
    /// Produces text for `ast`.
    fn serialize(&self, ast: &QueryAst) -> Result<String>;
}

/// SPARQL 1.1 renderer.
///
/// Emits one `PREFIX` line per declared prefix, a `SELECT` line, an indented
/// `WHERE` block and, when set, a trailing `LIMIT` line. IRIs that fall under
/// a declared namespace are written as prefixed names.
#[derive(Clone, Copy, Debug, Default)]
pub struct SparqlSerializer;

impl QuerySerializer for SparqlSerializer {
    fn serialize(&self, ast: &QueryAst) -> Result<String> {
        let mut out = String::new();
        write_query(&mut out, ast).map_err(|err| PipelineError::Server(err.to_string()))?;
        Ok(out)
    }
}

fn write_query(out: &mut String, ast: &QueryAst) -> std::fmt::Result {
    for (short, namespace) in &ast.prefixes {
        writeln!(out, "PREFIX {short}: <{namespace}>")?;
    }
    if ast.variables.is_empty() {
        writeln!(out, "SELECT *")?;
    } else {
        let projection: Vec<String> = ast.variables.iter().map(|v| format!("?{v}")).collect();
        writeln!(out, "SELECT {}", projection.join(" "))?;
    }
    writeln!(out, "WHERE {{")?;
    write_patterns(out, &ast.where_patterns, &ast.prefixes, 1)?;
    writeln!(out, "}}")?;
    if let Some(limit) = ast.limit {
        writeln!(out, "LIMIT {limit}")?;
    }
    Ok(())
}

fn write_patterns(
    out: &mut String,
    patterns: &[PatternNode],
    prefixes: &[(String, String)],
    depth: usize,
) -> std::fmt::Result {
    let indent = "  ".repeat(depth);
    for node in patterns {
        match node {
            PatternNode::Bgp { triples } => {
                for triple in triples {
                    writeln!(out, "{indent}{}", render_triple(triple, prefixes))?;
                }
            }
            PatternNode::Optional { patterns } => {
                writeln!(out, "{indent}OPTIONAL {{")?;
                write_patterns(out, patterns, prefixes, depth + 1)?;
                writeln!(out, "{indent}}}")?;
            }
            PatternNode::Group { patterns } => {
                writeln!(out, "{indent}{{")?;
                write_patterns(out, patterns, prefixes, depth + 1)?;
                writeln!(out, "{indent}}}")?;
            }
            PatternNode::Filter { expression } => {
                writeln!(out, "{indent}FILTER({expression})")?;
            }
            PatternNode::Service {
                endpoint,
                silent,
                body,
            } => {
                let silent = if *silent { "SILENT " } else { "" };
                writeln!(out, "{indent}SERVICE {silent}<{endpoint}> {{ {body} }}")?;
            }
        }
    }
    Ok(())
}

fn render_triple(triple: &TriplePattern, prefixes: &[(String, String)]) -> String {
    format!(
        "{} {} {} .",
        render_term(&triple.subject, prefixes),
        render_term(&triple.predicate, prefixes),
        render_term(&triple.object, prefixes)
    )
}

fn render_term(term: &AstTerm, prefixes: &[(String, String)]) -> String {
    match term {
        AstTerm::NamedNode { value } => render_iri(value, prefixes),
        AstTerm::Variable { value } => format!("?{value}"),
        AstTerm::BlankNode { label } => format!("_:{label}"),
        AstTerm::Literal {
            value,
            language,
            datatype,
        } => {
            let mut text = format!("\"{}\"", escape_literal(value));
            if !language.is_empty() {
                text.push('@');
                text.push_str(language);
            } else if let Some(datatype) = datatype {
                text.push_str("^^");
                text.push_str(&render_term(datatype, prefixes));
            }
            text
        }
    }
}

fn render_iri(iri: &str, prefixes: &[(String, String)]) -> String {
    for (short, namespace) in prefixes {
        if let Some(local) = iri.strip_prefix(namespace.as_str()) {
            if is_plain_local_name(local) {
                return format!("{short}:{local}");
            }
        }
    }
    format!("<{iri}>")
}

fn is_plain_local_name(local: &str) -> bool {
    !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !local.starts_with('-')
}
