//! Operations declared in configuration rather than in code.
//!
//! A declared operation is a query template: triple patterns written in term
//! shorthand, where `$name` stands for a request param. Params are strings
//! and are substituted as plain literals; an absent optional param leaves
//! the position as the variable `?name`. Each kept row becomes a JSON object
//! of its projected variables' lexical values.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use validator::Validate;

use super::operation::ErasedOperation;
use super::pipeline::{run_pipeline, PipelineServices};
use crate::error::{PipelineError, Result};
use crate::output::{OutputSpec, ShapeRef};
use crate::query::QueryBuilder;
use crate::term::{BindingRow, Term};

/// One triple of a declared query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TripleTemplate {
    /// Subject in term shorthand.
    #[validate(length(min = 1))]
    pub subject: String,
    /// Predicate in term shorthand.
    #[validate(length(min = 1))]
    pub predicate: String,
    /// Object in term shorthand.
    #[validate(length(min = 1))]
    pub object: String,
    /// Wraps the triple in `OPTIONAL`.
    #[serde(default)]
    pub optional: bool,
}

/// A request param accepted by a declared operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ParamDecl {
    /// Param name, referenced as `$name` in templates.
    #[validate(length(min = 1))]
    pub name: String,
    /// Whether the request must supply it.
    #[serde(default)]
    pub required: bool,
    /// Maximum length in characters.
    pub max_length: Option<usize>,
}

/// Query operation described in configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DeclaredOperation {
    /// Registry key.
    #[validate(length(min = 1))]
    pub name: String,
    /// Shape each row's local graph must satisfy.
    pub shape: ShapeRef,
    /// Focus variable, with or without `?`.
    #[validate(length(min = 1))]
    pub focus: String,
    /// Prefixes usable in the templates and emitted in the query.
    #[serde(default)]
    pub prefixes: BTreeMap<String, String>,
    /// Projected variables; empty selects every variable.
    #[serde(default)]
    pub select: Vec<String>,
    /// Triple patterns in order.
    #[serde(rename = "where")]
    #[validate(length(min = 1), nested)]
    pub patterns: Vec<TripleTemplate>,
    /// Raw filter expressions.
    #[serde(default)]
    pub filters: Vec<String>,
    /// Result cap.
    pub limit: Option<u64>,
    /// Accepted params.
    #[serde(default)]
    #[validate(nested)]
    pub params: Vec<ParamDecl>,
}

impl DeclaredOperation {
    /// Checks `params` against the declared params.
    ///
    /// Params must form an object of strings; unknown names, missing
    /// required names and over-long values are reported together.
    pub fn check_params(&self, params: &Value) -> Result<Map<String, Value>> {
        let Value::Object(fields) = params else {
            return Err(PipelineError::Validation {
                message: format!("params for '{}' must be an object", self.name),
                issues: Some(json!([{ "path": "params", "message": "expected object" }])),
            });
        };

        let mut issues = Vec::new();
        for (key, value) in fields {
            let Some(decl) = self.params.iter().find(|decl| &decl.name == key) else {
                issues.push(issue(key, "unknown param"));
                continue;
            };
            match value {
                Value::String(text) => {
                    if let Some(max) = decl.max_length {
                        if text.chars().count() > max {
                            issues.push(issue(key, &format!("longer than {max} characters")));
                        }
                    }
                }
                _ => issues.push(issue(key, "expected string")),
            }
        }
        for decl in self.params.iter().filter(|decl| decl.required) {
            if !fields.contains_key(&decl.name) {
                issues.push(issue(&decl.name, "required param is missing"));
            }
        }

        if issues.is_empty() {
            Ok(fields.clone())
        } else {
            Err(PipelineError::Validation {
                message: format!("params for '{}' failed validation", self.name),
                issues: Some(Value::Array(issues)),
            })
        }
    }

    /// Instantiates the template with `params`.
    pub fn build_query(&self, params: &Map<String, Value>) -> Result<QueryBuilder<Value>> {
        let prefixes: Vec<(String, String)> = self
            .prefixes
            .iter()
            .map(|(short, ns)| (short.clone(), ns.clone()))
            .collect();

        let mut builder = QueryBuilder::new();
        for (short, ns) in &prefixes {
            builder = builder.prefix(short.as_str(), ns.as_str());
        }
        builder = builder.select_variables(&self.select);
        for template in &self.patterns {
            let subject = resolve_term(&template.subject, &prefixes, params)?;
            let predicate = resolve_term(&template.predicate, &prefixes, params)?;
            let object = resolve_term(&template.object, &prefixes, params)?;
            builder = if template.optional {
                builder.optional_triple(subject, predicate, object)
            } else {
                builder.where_triple(subject, predicate, object)
            };
        }
        for filter in &self.filters {
            builder = builder.filter(filter.as_str());
        }
        if let Some(limit) = self.limit {
            builder = builder.limit(limit);
        }

        let select = self.select.clone();
        let spec = OutputSpec::from_patterns(
            self.shape.clone(),
            &self.focus,
            builder.patterns(),
            move |row| Ok(row_to_object(&select, row)),
        );
        Ok(builder.set_output_spec(spec))
    }
}

#[async_trait]
impl ErasedOperation for DeclaredOperation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, params: Value, services: &PipelineServices<'_>) -> Result<Vec<Value>> {
        let params = self.check_params(&params)?;
        let builder = self.build_query(&params)?;
        run_pipeline(services, &builder).await
    }
}

fn resolve_term(
    text: &str,
    prefixes: &[(String, String)],
    params: &Map<String, Value>,
) -> Result<Term> {
    match text.trim().strip_prefix('$') {
        Some(name) => Ok(match params.get(name).and_then(Value::as_str) {
            Some(value) => Term::literal(value),
            None => Term::var(name),
        }),
        None => Term::parse_shorthand(text, prefixes),
    }
}

fn row_to_object(select: &[String], row: &BindingRow) -> Value {
    let mut object = Map::new();
    if select.is_empty() {
        for (name, term) in row.iter() {
            object.insert(name.to_owned(), Value::from(term.value()));
        }
    } else {
        for name in select {
            let name = name.trim_start_matches(['?', '$']);
            if let Some(value) = row.value(name) {
                object.insert(name.to_owned(), Value::from(value));
            }
        }
    }
    Value::Object(object)
}

fn issue(path: &str, message: &str) -> Value {
    json!({ "path": format!("params.{path}"), "message": message })
}
